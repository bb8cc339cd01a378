use serde::{Deserialize, Serialize};

use crate::{IndexType, RealType};

/// Multistep formula family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LinearMultistep {
    /// Adams-Moulton, for non-stiff problems
    Adams,
    /// Backward differentiation formulas, for stiff problems
    Bdf,
}

/// How the implicit corrector equation is solved each step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonlinearIteration {
    /// Fixed-point iteration, no Jacobian needed. For non-stiff problems
    Functional,
    /// Modified Newton iteration with a dense LU factorisation. For stiff problems
    Newton,
}

/// Optional solver settings, applied when an integrator is initialized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverOptions {
    /// Maximum number of internal steps per call to `solve`
    pub max_num_steps: IndexType,
    /// First step size to try, estimated from the problem if `None`
    pub initial_step: Option<RealType>,
    pub max_step: RealType,
    pub min_step: RealType,
    /// Highest order of the multistep formula, 1 to 5
    pub max_order: IndexType,
    pub max_nonlin_iters: IndexType,
    pub max_err_test_fails: IndexType,
    pub max_conv_fails: IndexType,
    /// Safety factor on the nonlinear convergence test
    pub nonlin_conv_coef: RealType,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            max_num_steps: 500,
            initial_step: None,
            max_step: RealType::INFINITY,
            min_step: 0.0,
            max_order: 5,
            max_nonlin_iters: 3,
            max_err_test_fails: 7,
            max_conv_fails: 10,
            nonlin_conv_coef: 0.1,
        }
    }
}

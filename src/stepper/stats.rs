use std::fmt::{self, Display, Formatter};

use serde::Serialize;

use crate::{IndexType, RealType};

/// Performance counters of a stepper session
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub number_of_steps: IndexType,
    /// Calls to the right-hand side (ODE) or residual (DAE) function
    pub number_of_function_evals: IndexType,
    pub number_of_linear_setups: IndexType,
    pub number_of_jacobian_evals: IndexType,
    pub number_of_nonlinear_iterations: IndexType,
    pub number_of_nonlinear_conv_fails: IndexType,
    pub number_of_error_test_fails: IndexType,
    pub number_of_root_evals: IndexType,
    pub last_order: IndexType,
    pub last_step: RealType,
    pub current_step: RealType,
    pub current_time: RealType,
}

impl Display for Stats {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        writeln!(f, "nst = {}", self.number_of_steps)?;
        writeln!(f, "nfe = {}", self.number_of_function_evals)?;
        writeln!(f, "nsetups = {}", self.number_of_linear_setups)?;
        writeln!(f, "nje = {}", self.number_of_jacobian_evals)?;
        writeln!(f, "nni = {}", self.number_of_nonlinear_iterations)?;
        writeln!(f, "ncfn = {}", self.number_of_nonlinear_conv_fails)?;
        writeln!(f, "netf = {}", self.number_of_error_test_fails)?;
        writeln!(f, "nge = {}", self.number_of_root_evals)?;
        writeln!(f, "qlast = {}", self.last_order)?;
        writeln!(f, "hlast = {:e}", self.last_step)?;
        writeln!(f, "hcur = {:e}", self.current_step)?;
        write!(f, "tcur = {}", self.current_time)
    }
}

//! A self-contained variable-step multistep stepper with a flag-based interface.
//!
//! Problems are supplied through the raw-buffer callback traits [OdeCallbacks] and
//! [DaeCallbacks]. Callbacks return 0 on success, a positive value for a recoverable
//! failure (the stepper retries with a smaller step) and a negative value for an
//! unrecoverable failure. Session functions return one of the constants in [flags].
use crate::RealType;

mod convergence;
mod engine;
pub mod flags;
mod linear;
mod options;
mod root;
mod stats;

pub mod dae;
pub mod ode;

pub use dae::DaeSession;
pub use linear::DenseLinearSolver;
pub use ode::OdeSession;
pub use options::{LinearMultistep, NonlinearIteration, SolverOptions};
pub use stats::Stats;

/// Callbacks of an explicit problem `y' = f(t, y)`.
pub trait OdeCallbacks {
    fn rhs(&self, t: RealType, y: &[RealType], ydot: &mut [RealType]) -> i32;

    /// Write the Jacobian `df/dy` into the zeroed, column-major `jac` buffer.
    /// `fy` holds `f(t, y)`.
    fn jac(&self, t: RealType, y: &[RealType], fy: &[RealType], jac: &mut [RealType]) -> i32;

    fn roots(&self, t: RealType, y: &[RealType], gout: &mut [RealType]) -> i32;
}

/// Callbacks of an implicit problem `F(t, y, y') = 0`.
pub trait DaeCallbacks {
    fn res(&self, t: RealType, y: &[RealType], yp: &[RealType], rr: &mut [RealType]) -> i32;

    /// Write `dF/dy + cj dF/dy'` into the zeroed, column-major `jac` buffer.
    /// `rr` holds `F(t, y, yp)`.
    #[allow(clippy::too_many_arguments)]
    fn jac(
        &self,
        t: RealType,
        cj: RealType,
        y: &[RealType],
        yp: &[RealType],
        rr: &[RealType],
        jac: &mut [RealType],
    ) -> i32;

    fn roots(&self, t: RealType, y: &[RealType], yp: &[RealType], gout: &mut [RealType]) -> i32;
}

/// Session functions shared by [OdeSession] and [DaeSession]
macro_rules! impl_session_common {
    ($session:ty) => {
        impl $session {
            /// Scalar relative and absolute tolerances
            pub fn ss_tolerances(&mut self, rtol: RealType, atol: RealType) -> i32 {
                let atol = vec![atol; self.engine.n()];
                self.engine.sv_tolerances(rtol, &atol)
            }

            /// Scalar relative and per-component absolute tolerances
            pub fn sv_tolerances(&mut self, rtol: RealType, atol: &[RealType]) -> i32 {
                self.engine.sv_tolerances(rtol, atol)
            }

            /// Replace all optional settings at once
            pub fn set_options(&mut self, options: SolverOptions) -> i32 {
                self.engine.set_options(options)
            }

            pub fn options(&self) -> &SolverOptions {
                self.engine.options()
            }

            pub fn set_max_num_steps(&mut self, max_num_steps: IndexType) -> i32 {
                let options = SolverOptions {
                    max_num_steps,
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            pub fn set_init_step(&mut self, h0: RealType) -> i32 {
                let options = SolverOptions {
                    initial_step: Some(h0),
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            pub fn set_max_step(&mut self, max_step: RealType) -> i32 {
                let options = SolverOptions {
                    max_step,
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            pub fn set_min_step(&mut self, min_step: RealType) -> i32 {
                let options = SolverOptions {
                    min_step,
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            pub fn set_max_order(&mut self, max_order: IndexType) -> i32 {
                let options = SolverOptions {
                    max_order,
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            pub fn set_max_nonlin_iters(&mut self, max_nonlin_iters: IndexType) -> i32 {
                let options = SolverOptions {
                    max_nonlin_iters,
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            pub fn set_max_err_test_fails(&mut self, max_err_test_fails: IndexType) -> i32 {
                let options = SolverOptions {
                    max_err_test_fails,
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            pub fn set_max_conv_fails(&mut self, max_conv_fails: IndexType) -> i32 {
                let options = SolverOptions {
                    max_conv_fails,
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            pub fn set_nonlin_conv_coef(&mut self, nonlin_conv_coef: RealType) -> i32 {
                let options = SolverOptions {
                    nonlin_conv_coef,
                    ..self.engine.options().clone()
                };
                self.engine.set_options(options)
            }

            /// Attach the dense linear solver used by the Newton iteration
            pub fn set_linear_solver(&mut self, linear_solver: DenseLinearSolver) -> i32 {
                self.engine.set_linear_solver(linear_solver)
            }

            /// Enable root finding on `nroots` root functions, or disable it with 0
            pub fn root_init(&mut self, nroots: IndexType) -> i32 {
                self.engine.root_init(nroots)
            }

            /// Directions of the roots found by the last `solve` that returned a root:
            /// `1` rising, `-1` falling, `0` not found.
            pub fn get_root_info(&self, roots_found: &mut [i32]) -> i32 {
                self.engine.get_root_info(roots_found)
            }

            /// Interpolated solution (`k = 0`) or derivative (`k = 1`) within the last step
            pub fn get_dky(&self, t: RealType, k: IndexType, dky: &mut [RealType]) -> i32 {
                self.engine.get_dky(t, k, dky)
            }

            pub fn stats(&self) -> Stats {
                self.engine.stats()
            }
        }
    };
}
pub(crate) use impl_session_common;

//! # sdsolve
//!
//! ODE and DAE integrators behind a uniform vector/matrix abstraction and a model-callback
//! interface.
//!
//! A problem is written as an [OdeModel] (`y' = f(t, y)`) or a [DaeModel]
//! (`F(t, y, y') = 0`), optionally with root functions whose zero crossings stop the
//! integration. Models see the solver's buffers through the borrowed views
//! [SdVectorView], [SdVectorViewMut] and [SdMatrixViewMut], which only live for the duration
//! of one callback. An [OdeIntegrator] or [DaeIntegrator] drives the flag-based
//! [stepper] with the model and keeps the solution in owning [SdVector]s.
//!
//! ```
//! use sdsolve::{
//!     IntegratorStatus, ModelResult, OdeIntegrator, OdeModel, SdMatrixViewMut, SdVectorView,
//!     SdVectorViewMut,
//! };
//!
//! // a ball thrown upwards, stopping when it hits the ground
//! struct Ball;
//!
//! impl OdeModel for Ball {
//!     fn f(&self, _t: f64, y: &SdVectorView, ydot: &mut SdVectorViewMut) -> ModelResult {
//!         ydot[0] = y[1];
//!         ydot[1] = -9.81;
//!         Ok(())
//!     }
//!     fn g(&self, _t: f64, y: &SdVectorView, gout: &mut SdVectorViewMut) -> ModelResult {
//!         gout[0] = y[0];
//!         Ok(())
//!     }
//!     fn jac(
//!         &self,
//!         _t: f64,
//!         _y: &SdVectorView,
//!         _fy: &SdVectorView,
//!         jac: &mut SdMatrixViewMut,
//!     ) -> ModelResult {
//!         jac[(0, 1)] = 1.0;
//!         Ok(())
//!     }
//! }
//!
//! let ball = Ball;
//! let mut integrator = OdeIntegrator::new(2);
//! integrator.y0[0] = 1.0;
//! integrator.y0[1] = 5.0;
//! integrator.find_roots = true;
//! integrator.n_roots = 1;
//! integrator.set_ode(&ball).unwrap();
//! integrator.initialize().unwrap();
//! let status = integrator.integrate_to_time(10.0).unwrap();
//! assert_eq!(status, IntegratorStatus::RootFound);
//! assert_eq!(integrator.roots_found(), &[-1]);
//! ```
pub mod error;
pub mod integrator;
pub mod matrix;
pub mod model;
pub mod scalar;
pub mod stepper;
pub mod vector;

pub use error::IntegratorError;
pub use integrator::{
    check_flag, DaeIntegrator, FlagCheck, FlagValue, IntegratorStatus, OdeIntegrator,
    SessionState,
};
pub use matrix::{SdMatrix, SdMatrixViewMut};
pub use model::{status_from_flag, DaeModel, ModelError, ModelResult, OdeModel};
pub use scalar::{IndexType, RealType, UNIT_ROUNDOFF};
pub use stepper::{LinearMultistep, NonlinearIteration, SolverOptions, Stats};
pub use vector::{SdVector, SdVectorView, SdVectorViewMut};

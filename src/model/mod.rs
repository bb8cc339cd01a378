//! The problem definitions a user plugs into an integrator.
//!
//! An [OdeModel] gives the derivative explicitly, `y' = f(t, y)`; a [DaeModel]
//! gives an implicit residual `F(t, y, y') = 0`. Both can optionally supply a set
//! of root functions `g` whose zero crossings are reported as events, and must supply
//! a dense Jacobian used by the Newton iteration.
use thiserror::Error;

use crate::{RealType, SdMatrixViewMut, SdVectorView, SdVectorViewMut};

/// Failure signalled by a model callback
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The integrator will try again with a smaller step (e.g. `y` left the domain of `f`)
    #[error("Recoverable evaluation failure: {0}")]
    Recoverable(String),
    /// The current step fails and the integrator stops
    #[error("Unrecoverable evaluation failure: {0}")]
    Unrecoverable(String),
}

pub type ModelResult = Result<(), ModelError>;

/// Convert an integer status into a [ModelResult]: zero or positive is success,
/// negative is an unrecoverable failure.
pub fn status_from_flag(flag: i32) -> ModelResult {
    if flag >= 0 {
        Ok(())
    } else {
        Err(ModelError::Unrecoverable(format!(
            "callback returned flag {}",
            flag
        )))
    }
}

impl ModelError {
    /// The status value handed back to the stepper
    pub(crate) fn flag(result: &ModelResult) -> i32 {
        match result {
            Ok(()) => 0,
            Err(ModelError::Recoverable(_)) => 1,
            Err(ModelError::Unrecoverable(_)) => -1,
        }
    }
}

/// An ordinary differential equation `y' = f(t, y)`.
///
/// # Example
///
/// ```
/// use sdsolve::{ModelResult, OdeModel, SdMatrixViewMut, SdVectorView, SdVectorViewMut};
///
/// struct Decay;
///
/// impl OdeModel for Decay {
///     fn f(&self, _t: f64, y: &SdVectorView, ydot: &mut SdVectorViewMut) -> ModelResult {
///         ydot[0] = -y[0];
///         Ok(())
///     }
///     fn jac(
///         &self,
///         _t: f64,
///         _y: &SdVectorView,
///         _fy: &SdVectorView,
///         jac: &mut SdMatrixViewMut,
///     ) -> ModelResult {
///         jac[(0, 0)] = -1.0;
///         Ok(())
///     }
/// }
/// ```
pub trait OdeModel {
    /// Compute `ydot = f(t, y)`
    fn f(&self, t: RealType, y: &SdVectorView, ydot: &mut SdVectorViewMut) -> ModelResult;

    /// Compute the root functions `gout = g(t, y)`, one value per root.
    fn g(&self, _t: RealType, _y: &SdVectorView, _gout: &mut SdVectorViewMut) -> ModelResult {
        Ok(())
    }

    /// Compute the Jacobian `J = df/dy`, `fy` holds `f(t, y)`. `jac` is zeroed before the call.
    fn jac(
        &self,
        t: RealType,
        y: &SdVectorView,
        fy: &SdVectorView,
        jac: &mut SdMatrixViewMut,
    ) -> ModelResult;
}

/// A differential-algebraic system in implicit form `F(t, y, y') = 0`.
pub trait DaeModel {
    /// Compute the residual `res = F(t, y, ydot)`
    fn f(
        &self,
        t: RealType,
        y: &SdVectorView,
        ydot: &SdVectorView,
        res: &mut SdVectorViewMut,
    ) -> ModelResult;

    /// Compute the root functions `gout = g(t, y, ydot)`, one value per root.
    fn g(
        &self,
        _t: RealType,
        _y: &SdVectorView,
        _ydot: &SdVectorView,
        _gout: &mut SdVectorViewMut,
    ) -> ModelResult {
        Ok(())
    }

    /// Compute the iteration matrix `J = dF/dy + c_j dF/dydot`, where `c_j` is the
    /// scaling of `ydot` with respect to `y` used by the stepper (inversely
    /// proportional to the step size). `jac` is zeroed before the call.
    fn jac(
        &self,
        t: RealType,
        y: &SdVectorView,
        ydot: &SdVectorView,
        res: &SdVectorView,
        c_j: RealType,
        jac: &mut SdMatrixViewMut,
    ) -> ModelResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_flag() {
        assert_eq!(status_from_flag(0), Ok(()));
        assert_eq!(status_from_flag(3), Ok(()));
        assert!(matches!(
            status_from_flag(-1),
            Err(ModelError::Unrecoverable(_))
        ));
    }

    #[test]
    fn test_flag_conversion() {
        assert_eq!(ModelError::flag(&Ok(())), 0);
        assert_eq!(
            ModelError::flag(&Err(ModelError::Recoverable("x".into()))),
            1
        );
        assert_eq!(
            ModelError::flag(&Err(ModelError::Unrecoverable("x".into()))),
            -1
        );
    }

    struct NoRoots;

    impl OdeModel for NoRoots {
        fn f(&self, _t: RealType, _y: &SdVectorView, ydot: &mut SdVectorViewMut) -> ModelResult {
            ydot.fill(0.0);
            Ok(())
        }
        fn jac(
            &self,
            _t: RealType,
            _y: &SdVectorView,
            _fy: &SdVectorView,
            _jac: &mut SdMatrixViewMut,
        ) -> ModelResult {
            Ok(())
        }
    }

    #[test]
    fn test_default_root_function_writes_nothing() {
        let y = [1.0];
        let mut g = [42.0, 43.0];
        let result = NoRoots.g(0.0, &SdVectorView::new(&y), &mut SdVectorViewMut::new(&mut g));
        assert_eq!(result, Ok(()));
        assert_eq!(g, [42.0, 43.0]);
    }
}

use thiserror::Error;

/// Possible errors reported by an [crate::OdeIntegrator] or [crate::DaeIntegrator]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IntegratorError {
    #[error("{function} failed to allocate memory")]
    AllocationFailed { function: String },
    #[error("{function} failed with flag = {flag} ({name})")]
    SolverFailure {
        function: String,
        flag: i32,
        name: &'static str,
    },
    #[error("Integrator has not been initialized, call initialize() first")]
    NotInitialized,
    #[error("Integrator has already been initialized")]
    AlreadyInitialized,
    #[error("No model attached to the integrator")]
    ModelNotSet,
    #[error("Cannot replace the model after initialize() has registered its callbacks")]
    ModelRebind,
    #[error("A previous solver failure left the session unusable")]
    SessionFailed,
    #[error("Root finding is not enabled on this integrator")]
    RootFindingDisabled,
    #[error("{what} has length {found}, expected {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
    #[error("Operation not valid in the current integrator state: {0}")]
    InvalidState(&'static str),
    #[error("Maximum number of steps reached before tout, integration stopped at t = {t}")]
    TooMuchWork { t: f64 },
}

#[macro_export]
macro_rules! integrator_error {
    ($variant:ident) => {
        $crate::error::IntegratorError::$variant
    };
    ($variant:ident, $($arg:tt)*) => {
        $crate::error::IntegratorError::$variant { $($arg)* }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = integrator_error!(
            DimensionMismatch,
            what: "abstol",
            expected: 3,
            found: 2
        );
        assert_eq!(err.to_string(), "abstol has length 2, expected 3");
        let err = integrator_error!(TooMuchWork, t: 0.5);
        assert_eq!(err, IntegratorError::TooMuchWork { t: 0.5 });
        assert_eq!(
            err.to_string(),
            "Maximum number of steps reached before tout, integration stopped at t = 0.5"
        );
    }
}

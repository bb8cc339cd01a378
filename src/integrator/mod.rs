//! Integrators that drive the [stepper](crate::stepper) with a user [model](crate::model).
//!
//! An integrator is configured through its public fields, bound to a model with
//! `set_ode`/`set_dae`, set up with `initialize` and then advanced with
//! `integrate_to_time`. Every stepper call is checked with [check_flag].
use log::{debug, error, warn};

use crate::error::IntegratorError;
use crate::model::{ModelError, ModelResult};
use crate::stepper::flags::flag_name;
use crate::{integrator_error, IndexType};

pub mod dae;
pub mod ode;

#[cfg(test)]
pub mod test_models;

pub use dae::DaeIntegrator;
pub use ode::OdeIntegrator;

/// Lifecycle of an integrator session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Configuration can be changed and a model attached
    Uninitialized,
    /// The stepper session exists, no step has been taken
    Initialized,
    Stepping,
    /// The last call stopped at a root
    RootFound,
    /// A solver failure occurred, the session cannot be used again
    Failed,
}

/// Successful outcome of `integrate_to_time`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegratorStatus {
    /// The requested time was reached
    Success,
    /// Integration stopped at a root, see `roots_found`
    RootFound,
}

/// How [check_flag] interprets the value it is given
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagCheck {
    /// A session handle returned by an allocation function
    Allocation = 0,
    /// An `i32` return flag, negative values are failures
    ReturnFlag = 1,
    /// A component (e.g. a linear solver) returned by an allocation function
    ComponentAllocation = 2,
}

/// A value returned by a stepper function that can be checked with [check_flag]
pub trait FlagValue {
    /// `Some(flag)` if this is an integer return flag
    fn return_flag(&self) -> Option<i32>;
    /// Whether this is a missing allocation
    fn is_null(&self) -> bool;
}

impl FlagValue for i32 {
    fn return_flag(&self) -> Option<i32> {
        Some(*self)
    }
    fn is_null(&self) -> bool {
        false
    }
}

impl<T> FlagValue for Option<T> {
    fn return_flag(&self) -> Option<i32> {
        None
    }
    fn is_null(&self) -> bool {
        self.is_none()
    }
}

/// Check a value returned by the stepper function `funcname`.
///
/// With [FlagCheck::ReturnFlag] a negative integer flag is a failure; with the allocation
/// modes a `None` handle is. Any other combination passes. Failures are logged and
/// returned as an [IntegratorError].
pub fn check_flag<V: FlagValue>(
    value: &V,
    funcname: &str,
    mode: FlagCheck,
) -> Result<(), IntegratorError> {
    match mode {
        FlagCheck::Allocation | FlagCheck::ComponentAllocation => {
            if value.is_null() {
                error!("{}() failed - returned NULL pointer", funcname);
                return Err(IntegratorError::AllocationFailed {
                    function: funcname.to_string(),
                });
            }
        }
        FlagCheck::ReturnFlag => {
            if let Some(flag) = value.return_flag() {
                if flag < 0 {
                    let name = flag_name(flag);
                    error!("{}() failed with flag = {} ({})", funcname, flag, name);
                    return Err(IntegratorError::SolverFailure {
                        function: funcname.to_string(),
                        flag,
                        name,
                    });
                }
            }
        }
    }
    Ok(())
}

/// [check_flag] an allocation and hand back the allocated value
pub(crate) fn check_allocation<T>(
    value: Option<T>,
    funcname: &str,
    mode: FlagCheck,
) -> Result<T, IntegratorError> {
    check_flag(&value, funcname, mode)?;
    value.ok_or_else(|| integrator_error!(AllocationFailed, function: funcname.to_string()))
}

pub(crate) fn check_len(
    what: &'static str,
    expected: IndexType,
    found: IndexType,
) -> Result<(), IntegratorError> {
    if expected != found {
        return Err(integrator_error!(DimensionMismatch, what, expected, found));
    }
    Ok(())
}

/// Status flag handed back to the stepper for the result of the model callback `name`
pub(crate) fn model_flag(result: ModelResult, name: &str) -> i32 {
    match &result {
        Err(err @ ModelError::Recoverable(_)) => debug!("model {}: {}", name, err),
        Err(err @ ModelError::Unrecoverable(_)) => warn!("model {}: {}", name, err),
        Ok(()) => {}
    }
    ModelError::flag(&result)
}

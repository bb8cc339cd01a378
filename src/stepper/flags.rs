//! Return flags of the stepper functions.
//!
//! Non-negative values are successful returns, negative values are failures.

pub const SUCCESS: i32 = 0;
pub const ROOT_RETURN: i32 = 2;

/// The maximum number of steps was taken before reaching `tout`. The session is
/// still valid and calling `solve` again continues the integration.
pub const TOO_MUCH_WORK: i32 = -1;
pub const ERR_FAILURE: i32 = -3;
pub const CONV_FAILURE: i32 = -4;
pub const LSETUP_FAIL: i32 = -6;
pub const LSOLVE_FAIL: i32 = -7;
pub const RHSFUNC_FAIL: i32 = -8;
pub const FIRST_RHSFUNC_ERR: i32 = -9;
pub const RTFUNC_FAIL: i32 = -12;
pub const IC_FAIL: i32 = -14;
pub const ILL_INPUT: i32 = -22;
pub const NO_MALLOC: i32 = -23;
pub const BAD_K: i32 = -24;
pub const BAD_T: i32 = -25;
pub const LINSOL_NULL: i32 = -28;

/// Name of a return flag, for diagnostics
pub fn flag_name(flag: i32) -> &'static str {
    match flag {
        SUCCESS => "SUCCESS",
        ROOT_RETURN => "ROOT_RETURN",
        TOO_MUCH_WORK => "TOO_MUCH_WORK",
        ERR_FAILURE => "ERR_FAILURE",
        CONV_FAILURE => "CONV_FAILURE",
        LSETUP_FAIL => "LSETUP_FAIL",
        LSOLVE_FAIL => "LSOLVE_FAIL",
        RHSFUNC_FAIL => "RHSFUNC_FAIL",
        FIRST_RHSFUNC_ERR => "FIRST_RHSFUNC_ERR",
        RTFUNC_FAIL => "RTFUNC_FAIL",
        IC_FAIL => "IC_FAIL",
        ILL_INPUT => "ILL_INPUT",
        NO_MALLOC => "NO_MALLOC",
        BAD_K => "BAD_K",
        BAD_T => "BAD_T",
        LINSOL_NULL => "LINSOL_NULL",
        _ => "UNKNOWN",
    }
}

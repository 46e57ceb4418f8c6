//! # Error handling macros

/// Build a business error
#[macro_export]
macro_rules! business_error {
    ($msg:expr) => {
        $crate::error::LoadAuthError::business($msg)
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::error::LoadAuthError::business(format!($fmt, $($arg)*))
    };
}

/// Return a business error unless the condition holds
#[macro_export]
macro_rules! ensure_business {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::business_error!($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::business_error!($fmt, $($arg)*));
        }
    };
}

/// Return an invalid state error unless the condition holds
#[macro_export]
macro_rules! ensure_state {
    ($cond:expr, $msg:expr) => {
        if !($cond) {
            return Err($crate::error::LoadAuthError::invalid_state($msg));
        }
    };
    ($cond:expr, $fmt:expr, $($arg:tt)*) => {
        if !($cond) {
            return Err($crate::error::LoadAuthError::invalid_state(format!($fmt, $($arg)*)));
        }
    };
}

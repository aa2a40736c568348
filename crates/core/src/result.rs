//! Result type definition and extension traits.
//!
//! Provides combinators for Result types so that callers can fall back to
//! defaults without unwrap/expect/panic.

use crate::error::Error;

/// The standard Result type for Leasehold core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait providing safe combinators for Results.
pub trait ResultExt<T> {
    /// Get the value or a default, logging the error if present.
    fn or_default_logged(self, default: T) -> T;
}

impl<T> ResultExt<T> for Result<T> {
    fn or_default_logged(self, default: T) -> T {
        match self {
            Ok(value) => value,
            Err(e) => {
                tracing::error!("Operation failed, using default: {}", e);
                default
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_or_default_logged_ok() {
        let result: Result<i32> = Ok(42);
        assert_eq!(result.or_default_logged(0), 42);
    }

    #[test]
    fn test_or_default_logged() {
        let result: Result<&str> = Err(Error::toml_parse_failed("eof"));
        assert_eq!(result.or_default_logged("fallback"), "fallback");
    }
}

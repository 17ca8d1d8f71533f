//! Result type alias for discovery and execution operations

use crate::error::TestmateError;

/// Standard Result type for testmate operations
pub type Result<T> = std::result::Result<T, TestmateError>;

/// Extension trait for Result to provide additional convenience methods
pub trait ResultExt<T> {
    /// Log the error and continue with None
    fn log_and_continue(self, context: &str) -> Option<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn log_and_continue(self, context: &str) -> Option<T> {
        match self {
            Ok(value) => Some(value),
            Err(err) => {
                if err.is_recoverable() {
                    tracing::warn!("{}: {}", context, err);
                } else {
                    tracing::error!("{}: {}", context, err);
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestmateError;

    #[test]
    fn test_log_and_continue() {
        let res: Result<u32> = Ok(3);
        assert_eq!(res.log_and_continue("ctx"), Some(3));

        let res: Result<u32> = Err(TestmateError::internal_error("boom"));
        assert_eq!(res.log_and_continue("ctx"), None);
    }
}

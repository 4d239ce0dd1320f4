//! Error types for the LTI launch service

use std::io;

use thiserror::Error;

/// Result type alias for the LTI launch service
pub type Result<T> = std::result::Result<T, Error>;

/// Startup and I/O errors.
///
/// Per-request login and launch failures are [`crate::lti::LaunchError`].
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_message() {
        let err = Error::Config("tool.base_url is required".to_string());

        assert_eq!(err.to_string(), "Configuration error: tool.base_url is required");
    }

    #[test]
    fn io_error_converts() {
        let err: Error = io::Error::new(io::ErrorKind::AddrInUse, "busy").into();

        assert!(matches!(err, Error::Io(_)));
    }
}

//! Unified error types for the VVO workspace
//!
//! This module provides a common error type [`VvoError`] that can represent
//! errors from any part of the system. Domain-specific error types in the
//! algorithm layer convert to `VvoError` at API boundaries.

use thiserror::Error;

/// Unified error type for all VVO operations.
#[derive(Error, Debug)]
pub enum VvoError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Data validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Solver/algorithm errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Configuration errors (unknown system, bad preset, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network structure errors
    #[error("Network error: {0}")]
    Network(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

/// Convenience type alias for Results using VvoError.
pub type VvoResult<T> = Result<T, VvoError>;

impl From<anyhow::Error> for VvoError {
    fn from(err: anyhow::Error) -> Self {
        VvoError::Other(err.to_string())
    }
}

impl From<String> for VvoError {
    fn from(s: String) -> Self {
        VvoError::Other(s)
    }
}

impl From<&str> for VvoError {
    fn from(s: &str) -> Self {
        VvoError::Other(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = VvoError::Config("unsupported system: ieee300".into());
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("ieee300"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: VvoError = io_err.into();
        assert!(matches!(err, VvoError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> VvoResult<()> {
            Err(VvoError::Validation("test".into()))
        }

        fn outer() -> VvoResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}

//! Error types for gsmcal operations.

use thiserror::Error;

/// Result type for gsmcal operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the sample source and its collaborators.
///
/// Configuration and resource errors are fatal to the pipeline instance but
/// not to the process; a caller wishing to recover tears the pipeline down
/// and builds a new one. Dropped samples are *not* errors — they are reported
/// through the overrun count returned by `fill`.
#[derive(Debug, Error)]
pub enum Error {
    /// No matching radio front-end was found.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),

    /// The driver refused a parameter (sample rate, gain, LO frequency).
    #[error("configuration rejected: {0}")]
    ConfigurationRejected(String),

    /// An allocation or memory mapping failed.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A blocking wait was abandoned: streaming ended or exit was requested.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Create a device-unavailable error with a custom message.
    pub fn device<S: Into<String>>(msg: S) -> Self {
        Error::DeviceUnavailable(msg.into())
    }

    /// Create a configuration-rejected error with a custom message.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Error::ConfigurationRejected(msg.into())
    }

    /// Create a resource-exhausted error with a custom message.
    pub fn resource<S: Into<String>>(msg: S) -> Self {
        Error::ResourceExhausted(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device("no IIO context");
        assert_eq!(err.to_string(), "device unavailable: no IIO context");

        let err = Error::config("sampling_frequency write failed");
        assert!(err.to_string().starts_with("configuration rejected"));

        assert_eq!(Error::Cancelled.to_string(), "operation cancelled");
    }

    #[test]
    fn test_error_constructors() {
        assert!(matches!(
            Error::resource("mmap failed"),
            Error::ResourceExhausted(_)
        ));
    }
}

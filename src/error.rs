use thiserror::Error;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Failure reported by the remote content service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("remote call failed ({status}): {message}")]
pub struct TransportError {
    /// HTTP-like status code returned by the service.
    pub status: u16,
    pub message: String,
}

impl TransportError {
    pub fn new(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Shorthand for a 404 from the remote.
    pub fn not_found(what: impl std::fmt::Display) -> Self {
        Self::new(404, format!("{} not found", what))
    }
}

/// Errors surfaced by the tree synchronizer, store and commands.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A remote call failed.
    #[error("Transport error ({status}): {message}")]
    Transport { status: u16, message: String },

    /// Unknown group, unsupported persisted key or an invalid setting.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// I/O errors from the persisted storage file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed persisted value or fixture.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SyncError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        SyncError::Configuration(msg.into())
    }

    /// Whether the error came from the remote service.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport { .. })
    }
}

impl From<TransportError> for SyncError {
    fn from(err: TransportError) -> Self {
        SyncError::Transport {
            status: err.status,
            message: err.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "state file missing");
        let err: SyncError = io_err.into();
        assert!(matches!(err, SyncError::Io(_)));
        assert!(err.to_string().contains("state file missing"));
    }

    #[test]
    fn transport_error_conversion_keeps_status() {
        let err: SyncError = TransportError::new(502, "bad gateway").into();
        assert!(err.is_transport());
        assert_eq!(err.to_string(), "Transport error (502): bad gateway");
    }

    #[test]
    fn configuration_error_display() {
        let err = SyncError::configuration("invalid group: Bogus");
        assert_eq!(err.to_string(), "Configuration error: invalid group: Bogus");
        assert!(!err.is_transport());
    }

    #[test]
    fn not_found_transport_error() {
        let err = TransportError::not_found("gist abc");
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "gist abc not found");
    }
}

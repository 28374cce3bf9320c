//! Error types shared by every webssh crate.

use std::{fmt, time::Duration};

use thiserror::Error;

/// A file operation, used to label remote failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileOp {
    List,
    Read,
    Write,
    CreateDirectory,
    Delete,
    Download,
    Upload,
}

impl fmt::Display for FileOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::List => "Failed to read directory",
            Self::Read => "Failed to read file",
            Self::Write => "Failed to write file",
            Self::CreateDirectory => "Failed to create directory",
            Self::Delete => "Failed to delete file",
            Self::Download => "Failed to download file",
            Self::Upload => "Failed to upload file",
        };
        f.write_str(label)
    }
}

/// Error reported to the client for any session event.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Bad parameters or paths. Never reaches the remote side.
    #[error("Validation failed: {}", .0.join(", "))]
    Validation(Vec<String>),
    /// Authentication or network failure while establishing the connection.
    #[error("SSH connection error: {0}")]
    Handshake(String),
    /// The shell or SFTP channel failed after the connection was up.
    #[error("Channel error: {0}")]
    Channel(String),
    /// A single file operation failed; the session stays usable.
    #[error("{op}: {message}")]
    RemoteOperation { op: FileOp, message: String },
    /// No ready connection for this session.
    #[error("Not connected to an SSH server")]
    NotConnected,
    /// The external suggestion provider failed.
    #[error("Suggestion service error: {0}")]
    SuggestionService(String),
}

impl SessionError {
    /// Single-violation validation error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Validation(vec![message.into()])
    }

    /// Whether this error ends the whole session.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Handshake(_) | Self::Channel(_))
    }
}

/// Error reported by a remote capability implementation.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Connection failed: {0}")]
    Connect(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Channel error: {0}")]
    Channel(String),
    #[error("{0}")]
    Operation(String),
    #[error("File too large: {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// The session was disconnected while the call was pending.
    #[error("Operation cancelled")]
    Cancelled,
}

/// Error from an external suggestion provider.
#[derive(Debug, Error)]
pub enum SuggestionError {
    #[error("Suggestion service unavailable")]
    Unavailable,
    #[error("Suggestion request failed: {0}")]
    RequestFailed(String),
    #[error("Malformed suggestion response: {0}")]
    MalformedResponse(String),
}

impl From<SuggestionError> for SessionError {
    fn from(err: SuggestionError) -> Self {
        Self::SuggestionService(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_message_lists_every_violation() {
        let err = SessionError::Validation(vec!["bad port".into(), "bad user".into()]);
        assert_eq!(err.to_string(), "Validation failed: bad port, bad user");
    }

    #[test]
    fn test_remote_operation_message() {
        let err = SessionError::RemoteOperation {
            op: FileOp::Delete,
            message: "No such file".into(),
        };
        assert_eq!(err.to_string(), "Failed to delete file: No such file");
        assert!(!err.is_fatal());
        assert!(SessionError::Channel("gone".into()).is_fatal());
    }
}

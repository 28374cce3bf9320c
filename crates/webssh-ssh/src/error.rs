//! SSH error types.

use thiserror::Error;
use webssh_core::RemoteError;

#[derive(Debug, Error)]
pub enum SshError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("SFTP error: {0}")]
    Sftp(String),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        Self::ProtocolError(err.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        Self::KeyError(err.to_string())
    }
}

impl From<russh_sftp::client::error::Error> for SshError {
    fn from(err: russh_sftp::client::error::Error) -> Self {
        Self::Sftp(err.to_string())
    }
}

impl From<SshError> for RemoteError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::ConnectionFailed(msg) | SshError::ProtocolError(msg) => Self::Connect(msg),
            SshError::AuthenticationFailed(msg) | SshError::KeyError(msg) => Self::Auth(msg),
            SshError::ChannelError(msg) => Self::Channel(msg),
            SshError::Sftp(msg) => Self::Operation(msg),
            SshError::IoError(e) => Self::Io(e),
        }
    }
}

//! SSH capability for webssh sessions.
//!
//! Provides:
//! - `SshConnector` - Connect and authenticate with russh
//! - `SshHandle` - Shell and SFTP channels over one connection
//! - `SftpFiles` - File operations over russh-sftp

pub mod client;
pub mod error;
pub mod sftp;
pub mod shell;

pub use client::{SshConnector, SshHandle};
pub use error::SshError;
pub use sftp::SftpFiles;
pub use shell::SshShell;

//! Remote capability traits.
//!
//! The session manager orchestrates these; it never speaks SSH itself.
//! `webssh-ssh` implements them on top of russh.

use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{ConnectParams, RemoteError};

/// Terminal dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermSize {
    pub cols: u16,
    pub rows: u16,
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 80, rows: 24 }
    }
}

/// Kind of a directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Directory entry as reported by the remote file subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: FileKind,
    pub size: u64,
    /// Unix epoch seconds.
    pub modified_at: u64,
    /// `ls -l` style mode string, e.g. `drwxr-xr-x`.
    pub permissions: String,
}

impl FileEntry {
    /// Render a mode string from a kind and raw permission bits.
    #[must_use]
    pub fn mode_string(kind: FileKind, mode: u32) -> String {
        let type_char = match kind {
            FileKind::Directory => 'd',
            FileKind::Symlink => 'l',
            FileKind::File | FileKind::Other => '-',
        };
        let mut out = String::with_capacity(10);
        out.push(type_char);
        for shift in [6, 3, 0] {
            let bits = (mode >> shift) & 0o7;
            out.push(if bits & 0o4 != 0 { 'r' } else { '-' });
            out.push(if bits & 0o2 != 0 { 'w' } else { '-' });
            out.push(if bits & 0o1 != 0 { 'x' } else { '-' });
        }
        out
    }
}

/// Something the shell channel produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellEvent {
    /// Raw bytes, forwarded verbatim.
    Data(Vec<u8>),
    /// The channel failed. The stream ends after this.
    Error(String),
}

/// Control side of an interactive shell channel.
#[async_trait]
pub trait ShellControl: Send + Sync {
    /// Whether input can currently be written.
    fn is_writable(&self) -> bool;

    /// Write input bytes.
    async fn write(&self, data: &[u8]) -> Result<(), RemoteError>;

    /// Forward a window size change.
    async fn resize(&self, size: TermSize) -> Result<(), RemoteError>;

    /// Close the channel.
    async fn close(&self) -> Result<(), RemoteError>;
}

/// An opened shell: control half plus output stream.
///
/// The output receiver yields until the remote side closes the channel.
pub struct ShellChannel {
    pub control: Box<dyn ShellControl>,
    pub output: mpsc::Receiver<ShellEvent>,
}

/// Remote file subsystem (SFTP).
#[async_trait]
pub trait FileSubsystem: Send + Sync {
    /// List a directory in the order the remote reports it.
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>, RemoteError>;

    /// Read a whole file, failing with [`RemoteError::TooLarge`] past `limit` bytes.
    async fn read(&self, path: &str, limit: u64) -> Result<Vec<u8>, RemoteError>;

    /// Create or truncate `path` and write `content`.
    ///
    /// Must only return `Ok` once the write stream has been closed and the
    /// remote acknowledged it.
    async fn write(&self, path: &str, content: &[u8]) -> Result<(), RemoteError>;

    /// Create a directory with the given mode.
    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), RemoteError>;

    /// Remove a single file or link.
    async fn remove_file(&self, path: &str) -> Result<(), RemoteError>;

    /// Copy a remote file to a local path, returning the byte count.
    async fn download(&self, remote: &str, local: &Path) -> Result<u64, RemoteError>;

    /// Copy a local file to a remote path, returning the byte count.
    async fn upload(&self, local: &Path, remote: &str) -> Result<u64, RemoteError>;

    /// Close the subsystem channel.
    async fn close(&self) -> Result<(), RemoteError>;
}

/// An authenticated connection to one remote host.
#[async_trait]
pub trait RemoteHandle: Send + Sync {
    /// Request a PTY and an interactive shell.
    async fn open_shell(&self, size: TermSize) -> Result<ShellChannel, RemoteError>;

    /// Open the file subsystem.
    async fn open_file_subsystem(&self) -> Result<Box<dyn FileSubsystem>, RemoteError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), RemoteError>;
}

/// Establishes remote connections.
#[async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Connect and authenticate.
    ///
    /// Implementations are expected to keep the connection alive on their
    /// own; the caller bounds the whole call with its ready timeout.
    async fn connect(&self, params: &ConnectParams) -> Result<Box<dyn RemoteHandle>, RemoteError>;
}

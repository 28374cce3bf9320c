//! SFTP file operations over an existing SSH connection.

use std::path::Path;

use async_trait::async_trait;
use russh::{Channel, client};
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::FileAttributes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};
use webssh_core::{FileEntry, FileKind, FileSubsystem, RemoteError};

use crate::error::SshError;

/// SFTP subsystem bound to one SSH connection.
pub struct SftpFiles {
    sftp: SftpSession,
}

impl SftpFiles {
    /// Request the `sftp` subsystem on `channel`.
    pub(crate) async fn open(channel: Channel<client::Msg>) -> Result<Self, SshError> {
        channel
            .request_subsystem(true, "sftp")
            .await
            .map_err(|e| SshError::ChannelError(format!("Failed to request SFTP subsystem: {e}")))?;

        let sftp = SftpSession::new(channel.into_stream())
            .await
            .map_err(|e| SshError::ChannelError(e.to_string()))?;

        info!("SFTP subsystem opened");
        Ok(Self { sftp })
    }
}

fn entry_kind(attrs: &FileAttributes) -> FileKind {
    if attrs.is_dir() {
        FileKind::Directory
    } else if attrs.is_symlink() {
        FileKind::Symlink
    } else if attrs.is_regular() {
        FileKind::File
    } else {
        FileKind::Other
    }
}

#[async_trait]
impl FileSubsystem for SftpFiles {
    async fn read_dir(&self, path: &str) -> Result<Vec<FileEntry>, RemoteError> {
        debug!("Listing directory: {path}");

        let entries = self.sftp.read_dir(path).await.map_err(SshError::from)?;

        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| {
                let attrs = entry.metadata();
                let kind = entry_kind(&attrs);
                FileEntry {
                    name: entry.file_name(),
                    kind,
                    size: attrs.size.unwrap_or(0),
                    modified_at: attrs.mtime.map_or(0, u64::from),
                    permissions: FileEntry::mode_string(kind, attrs.permissions.unwrap_or(0)),
                }
            })
            .collect())
    }

    async fn read(&self, path: &str, limit: u64) -> Result<Vec<u8>, RemoteError> {
        let file = self.sftp.open(path).await.map_err(SshError::from)?;

        let mut content = Vec::new();
        file.take(limit.saturating_add(1))
            .read_to_end(&mut content)
            .await?;

        let size = content.len() as u64;
        if size > limit {
            return Err(RemoteError::TooLarge { size, limit });
        }
        Ok(content)
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), RemoteError> {
        debug!("Writing {} bytes to file: {path}", content.len());

        let mut file = self.sftp.create(path).await.map_err(SshError::from)?;
        file.write_all(content).await?;
        file.flush().await?;
        // Sends the close request and waits for the server status.
        file.shutdown().await?;

        Ok(())
    }

    async fn mkdir(&self, path: &str, mode: u32) -> Result<(), RemoteError> {
        info!("Creating directory: {path}");

        self.sftp.create_dir(path).await.map_err(SshError::from)?;

        let mut attrs = FileAttributes::empty();
        attrs.permissions = Some(mode);
        let applied = self
            .sftp
            .set_metadata(path, attrs)
            .await
            .map_err(SshError::from);
        settle_mode(path, applied);

        Ok(())
    }

    async fn remove_file(&self, path: &str) -> Result<(), RemoteError> {
        info!("Deleting: {path}");
        self.sftp.remove_file(path).await.map_err(SshError::from)?;
        Ok(())
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<u64, RemoteError> {
        let mut remote_file = self.sftp.open(remote).await.map_err(SshError::from)?;
        let mut local_file = tokio::fs::File::create(local).await?;

        let copied = tokio::io::copy(&mut remote_file, &mut local_file).await?;
        local_file.flush().await?;

        info!("Downloaded {copied} bytes from {remote} to {}", local.display());
        Ok(copied)
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<u64, RemoteError> {
        let mut local_file = tokio::fs::File::open(local).await?;
        let mut remote_file = self.sftp.create(remote).await.map_err(SshError::from)?;

        let copied = tokio::io::copy(&mut local_file, &mut remote_file).await?;
        remote_file.shutdown().await?;

        info!("Uploaded {copied} bytes from {} to {remote}", local.display());
        Ok(copied)
    }

    async fn close(&self) -> Result<(), RemoteError> {
        self.sftp.close().await.map_err(SshError::from)?;
        Ok(())
    }
}

/// Once `create_dir` succeeded the directory exists, so a refused mode
/// change is logged rather than reported. Returns whether the mode stuck.
fn settle_mode(path: &str, applied: Result<(), SshError>) -> bool {
    match applied {
        Ok(()) => true,
        Err(e) => {
            warn!(path, "Directory created but its mode was not applied: {e}");
            false
        }
    }
}

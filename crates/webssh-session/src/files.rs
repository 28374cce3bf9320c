//! File operations over the session's SFTP channel.
//!
//! The channel is opened on first use and cached on the record. Remote
//! failures are reported per operation and leave the session usable.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};
use webssh_core::{FileEntry, FileOp, FileSubsystem, RemoteError, SessionError, validate_path};

use crate::{
    manager::{SessionManager, fail_session, ready_record},
    output::SessionOutput,
    registry::SessionGuard,
};

/// Mode for directories created through `create_directory`.
pub const DIRECTORY_MODE: u32 = 0o755;

/// A remote file staged for the client to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Downloaded {
    pub file_name: String,
    pub download_path: String,
}

impl SessionManager {
    /// List a remote directory in the order the server reports it.
    ///
    /// # Errors
    /// Returns [`SessionError::Validation`] for an unsafe path,
    /// [`SessionError::NotConnected`] without a ready connection, or
    /// [`SessionError::RemoteOperation`] when the listing fails.
    pub async fn list_files(
        &self,
        session_id: &str,
        path: &str,
    ) -> Result<Vec<FileEntry>, SessionError> {
        check_path(path)?;
        let guard = self.files_guard(session_id).await?;
        let entries = guard
            .until_cancelled(subsystem(&guard)?.read_dir(path))
            .await
            .map_err(remote(FileOp::List))?;
        debug!(session_id, path, count = entries.len(), "Listed directory");
        Ok(entries)
    }

    /// Read a whole remote file as text, replacing invalid UTF-8.
    ///
    /// # Errors
    /// As [`Self::list_files`]; files over the configured read limit fail
    /// with [`SessionError::RemoteOperation`].
    pub async fn read_file(&self, session_id: &str, path: &str) -> Result<String, SessionError> {
        check_path(path)?;
        let guard = self.files_guard(session_id).await?;
        let bytes = guard
            .until_cancelled(subsystem(&guard)?.read(path, self.config.max_read_bytes))
            .await
            .map_err(remote(FileOp::Read))?;
        debug!(session_id, path, len = bytes.len(), "Read file");
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Create or overwrite a remote file.
    ///
    /// Returns once the remote has acknowledged closing the file.
    ///
    /// # Errors
    /// As [`Self::list_files`].
    pub async fn write_file(
        &self,
        session_id: &str,
        path: &str,
        content: &str,
    ) -> Result<(), SessionError> {
        check_path(path)?;
        let guard = self.files_guard(session_id).await?;
        guard
            .until_cancelled(subsystem(&guard)?.write(path, content.as_bytes()))
            .await
            .map_err(remote(FileOp::Write))?;
        debug!(session_id, path, len = content.len(), "Wrote file");
        Ok(())
    }

    /// Create a remote directory with mode `0755`.
    ///
    /// # Errors
    /// As [`Self::list_files`].
    pub async fn create_directory(&self, session_id: &str, path: &str) -> Result<(), SessionError> {
        check_path(path)?;
        let guard = self.files_guard(session_id).await?;
        guard
            .until_cancelled(subsystem(&guard)?.mkdir(path, DIRECTORY_MODE))
            .await
            .map_err(remote(FileOp::CreateDirectory))?;
        debug!(session_id, path, "Created directory");
        Ok(())
    }

    /// Delete a single remote file. Directories are not removed.
    ///
    /// # Errors
    /// As [`Self::list_files`].
    pub async fn delete_file(&self, session_id: &str, path: &str) -> Result<(), SessionError> {
        check_path(path)?;
        let guard = self.files_guard(session_id).await?;
        guard
            .until_cancelled(subsystem(&guard)?.remove_file(path))
            .await
            .map_err(remote(FileOp::Delete))?;
        debug!(session_id, path, "Deleted file");
        Ok(())
    }

    /// Copy a remote file into the download directory.
    ///
    /// Files are staged by base name, so a later download of the same name
    /// replaces an earlier one.
    ///
    /// # Errors
    /// As [`Self::list_files`]; a path without a file name is a validation
    /// error.
    pub async fn download_file(
        &self,
        session_id: &str,
        path: &str,
    ) -> Result<Downloaded, SessionError> {
        check_path(path)?;
        let file_name = Path::new(path)
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToString::to_string)
            .ok_or_else(|| SessionError::invalid("Download path must name a file"))?;

        let guard = self.files_guard(session_id).await?;
        let dir = &self.config.download_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| remote(FileOp::Download)(e.into()))?;

        let local = dir.join(&file_name);
        let bytes = guard
            .until_cancelled(subsystem(&guard)?.download(path, &local))
            .await
            .map_err(remote(FileOp::Download))?;
        info!(session_id, path, bytes, local = %local.display(), "Downloaded file");

        Ok(Downloaded {
            download_path: format!(
                "{}/{file_name}",
                self.config.download_route.trim_end_matches('/')
            ),
            file_name,
        })
    }

    /// Push a locally staged file to `<remote_dir>/<file_name>`.
    ///
    /// The session is notified with [`SessionOutput::UploadComplete`].
    /// Returns the remote path.
    ///
    /// # Errors
    /// As [`Self::list_files`]; the file name must not contain a separator.
    pub async fn upload_file(
        &self,
        session_id: &str,
        local: &Path,
        remote_dir: &str,
        file_name: &str,
    ) -> Result<String, SessionError> {
        check_path(remote_dir)?;
        if file_name.contains(['/', '\\']) || !validate_path(file_name) {
            return Err(SessionError::invalid("Invalid file name"));
        }
        let remote_path = if remote_dir.ends_with('/') {
            format!("{remote_dir}{file_name}")
        } else {
            format!("{remote_dir}/{file_name}")
        };

        let guard = self.files_guard(session_id).await?;
        let bytes = guard
            .until_cancelled(subsystem(&guard)?.upload(local, &remote_path))
            .await
            .map_err(remote(FileOp::Upload))?;
        info!(session_id, path = %remote_path, bytes, "Uploaded file");

        if let Some(record) = guard.record() {
            record.notify(SessionOutput::UploadComplete {
                file_name: file_name.to_string(),
                path: remote_path.clone(),
            });
        }
        Ok(remote_path)
    }

    /// Lock a ready session and make sure its SFTP channel is open.
    async fn files_guard(&self, session_id: &str) -> Result<SessionGuard, SessionError> {
        let mut guard = self.registry.lock(session_id).await;
        if ready_record(&mut guard)?.has_files() {
            return Ok(guard);
        }

        let opened = {
            let handle = guard
                .record()
                .and_then(|r| r.handle.as_deref())
                .ok_or(SessionError::NotConnected)?;
            guard.until_cancelled(handle.open_file_subsystem()).await
        };

        match opened {
            Ok(files) => {
                ready_record(&mut guard)?.files = Some(files);
                debug!(session_id, "SFTP channel opened");
                Ok(guard)
            }
            Err(e) => {
                fail_session(&mut guard, &e).await;
                Err(SessionError::Channel(e.to_string()))
            }
        }
    }
}

fn subsystem(guard: &SessionGuard) -> Result<&dyn FileSubsystem, SessionError> {
    guard
        .record()
        .and_then(|r| r.files.as_deref())
        .ok_or(SessionError::NotConnected)
}

fn check_path(path: &str) -> Result<(), SessionError> {
    if validate_path(path) {
        Ok(())
    } else {
        Err(SessionError::invalid("Invalid path"))
    }
}

fn remote(op: FileOp) -> impl FnOnce(RemoteError) -> SessionError {
    move |e| SessionError::RemoteOperation {
        op,
        message: e.to_string(),
    }
}

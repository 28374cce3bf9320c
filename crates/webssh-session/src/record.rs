//! Connection records.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use webssh_core::{ConnectParams, FileSubsystem, RemoteHandle, ShellControl};

use crate::output::{OutputSink, SessionOutput};

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection.
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Authenticated and usable.
    Ready,
    /// Resources are being released.
    Closing,
    /// Handshake or channel failure.
    Failed,
}

/// Resources owned by one session.
///
/// The handle, shell and file subsystem are never shared with another
/// session. Consuming the record through [`SessionRecord::close`] releases
/// each of them exactly once.
pub struct SessionRecord {
    pub(crate) state: ConnectionState,
    pub(crate) generation: u64,
    pub(crate) host: String,
    pub(crate) username: String,
    pub(crate) handle: Option<Box<dyn RemoteHandle>>,
    pub(crate) shell: Option<Box<dyn ShellControl>>,
    pub(crate) files: Option<Box<dyn FileSubsystem>>,
    pub(crate) sink: OutputSink,
}

impl SessionRecord {
    /// New record for a handshake that is about to start.
    #[must_use]
    pub fn connecting(generation: u64, params: &ConnectParams, sink: OutputSink) -> Self {
        Self {
            state: ConnectionState::Connecting,
            generation,
            host: params.host.clone(),
            username: params.username.clone(),
            handle: None,
            shell: None,
            files: None,
            sink,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub const fn has_shell(&self) -> bool {
        self.shell.is_some()
    }

    #[must_use]
    pub const fn has_files(&self) -> bool {
        self.files.is_some()
    }

    /// Push output to the session's client.
    pub fn notify(&self, output: SessionOutput) {
        if self.sink.send(output).is_err() {
            debug!("Session output sink already closed");
        }
    }

    /// Release the shell, then the file subsystem, then the connection.
    ///
    /// Close errors are logged and swallowed so a misbehaving remote cannot
    /// block teardown.
    pub async fn close(mut self) {
        self.state = ConnectionState::Closing;

        if let Some(shell) = self.shell.take() {
            if let Err(e) = shell.close().await {
                warn!(host = %self.host, "Failed to close shell channel: {e}");
            }
        }
        if let Some(files) = self.files.take() {
            if let Err(e) = files.close().await {
                warn!(host = %self.host, "Failed to close SFTP channel: {e}");
            }
        }
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.close().await {
                warn!(host = %self.host, "Failed to close SSH connection: {e}");
            }
        }

        self.state = ConnectionState::Disconnected;
        info!(host = %self.host, username = %self.username, "Connection resources released");
    }

    /// Tear down after a fatal error and tell the client.
    pub async fn fail(mut self) {
        warn!(host = %self.host, from = ?self.state, "Session failed, tearing down");
        self.state = ConnectionState::Failed;
        let sink = self.sink.clone();
        self.close().await;
        let _ = sink.send(SessionOutput::Closed);
    }
}

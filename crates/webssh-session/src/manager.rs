//! Session manager for SSH connection lifecycles.

use std::{path::PathBuf, sync::Arc, time::Duration};

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use webssh_core::{
    ConnectRequest, RemoteConnector, RemoteError, SessionError, ShellChannel, ShellEvent,
    SuggestionProvider, TermSize, local_suggestions, validate_command_text,
};

use crate::{
    output::{OutputSink, SessionOutput},
    record::{ConnectionState, SessionRecord},
    registry::{SessionGuard, SessionRegistry},
};

/// Tunables for every session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Upper bound on connect plus authentication.
    pub ready_timeout: Duration,
    /// PTY size requested when the shell opens.
    pub term_size: TermSize,
    /// Largest file `read_file` will buffer.
    pub max_read_bytes: u64,
    /// Local directory downloads are staged in.
    pub download_dir: PathBuf,
    /// URL prefix the download directory is served under.
    pub download_route: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ready_timeout: Duration::from_secs(20),
            term_size: TermSize::default(),
            max_read_bytes: 10 * 1024 * 1024,
            download_dir: PathBuf::from("./downloads"),
            download_route: "/downloads".to_string(),
        }
    }
}

/// Result of a successful connect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Connected {
    pub host: String,
    pub username: String,
}

/// Orchestrates connections, shells and file channels per session.
pub struct SessionManager {
    pub(crate) connector: Arc<dyn RemoteConnector>,
    pub(crate) registry: SessionRegistry,
    pub(crate) suggestions: Option<Arc<dyn SuggestionProvider>>,
    pub(crate) config: SessionConfig,
}

impl SessionManager {
    /// Create a new session manager.
    #[must_use]
    pub fn new(connector: Arc<dyn RemoteConnector>, config: SessionConfig) -> Self {
        Self {
            connector,
            registry: SessionRegistry::new(),
            suggestions: None,
            config,
        }
    }

    /// Use an external provider for command suggestions.
    #[must_use]
    pub fn with_suggestion_provider(mut self, provider: Arc<dyn SuggestionProvider>) -> Self {
        self.suggestions = Some(provider);
        self
    }

    #[must_use]
    pub const fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Connect a session, replacing any connection it already has.
    ///
    /// # Errors
    /// Returns [`SessionError::Validation`] with every violation when the
    /// request is malformed (no connection is attempted), or
    /// [`SessionError::Handshake`] when the remote refuses or the ready
    /// timeout elapses.
    pub async fn connect(
        &self,
        session_id: &str,
        request: ConnectRequest,
        sink: OutputSink,
    ) -> Result<Connected, SessionError> {
        let params = request.into_params().map_err(SessionError::Validation)?;

        let mut guard = self.registry.lock(session_id).await;
        if let Some(previous) = guard.take() {
            info!(session_id, host = %previous.host(), "Replacing existing connection");
            previous.close().await;
        }
        guard.put(SessionRecord::connecting(
            self.registry.next_generation(),
            &params,
            sink,
        ));

        info!(
            session_id,
            host = %params.host,
            port = params.port,
            username = %params.username,
            auth = params.auth.kind(),
            "Connecting"
        );

        let timeout = self.config.ready_timeout;
        let handshake = async {
            tokio::time::timeout(timeout, self.connector.connect(&params))
                .await
                .unwrap_or(Err(RemoteError::Timeout(timeout)))
        };
        let result = guard.until_cancelled(handshake).await;

        match result {
            Ok(handle) => {
                if let Some(record) = guard.record_mut() {
                    record.handle = Some(handle);
                    record.state = ConnectionState::Ready;
                }
                info!(session_id, host = %params.host, "SSH connection ready");
                Ok(Connected {
                    host: params.host,
                    username: params.username,
                })
            }
            Err(RemoteError::Cancelled) => {
                info!(session_id, host = %params.host, "Connect cancelled by disconnect");
                Err(SessionError::Handshake(RemoteError::Cancelled.to_string()))
            }
            Err(e) => {
                warn!(session_id, host = %params.host, "SSH connection failed: {e}");
                if let Some(mut record) = guard.take() {
                    record.state = ConnectionState::Failed;
                    record.close().await;
                }
                Err(SessionError::Handshake(e.to_string()))
            }
        }
    }

    /// Open the interactive shell and start forwarding its output.
    ///
    /// A session has at most one shell; calling this again is a no-op.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] without a ready connection, or
    /// [`SessionError::Channel`] when the shell cannot be opened. The latter
    /// tears the session down.
    pub async fn open_shell(&self, session_id: &str) -> Result<(), SessionError> {
        let mut guard = self.registry.lock(session_id).await;
        if ready_record(&mut guard)?.has_shell() {
            debug!(session_id, "Shell already open");
            return Ok(());
        }

        let opened = {
            let handle = guard
                .record()
                .and_then(|r| r.handle.as_deref())
                .ok_or(SessionError::NotConnected)?;
            guard
                .until_cancelled(handle.open_shell(self.config.term_size))
                .await
        };

        match opened {
            Ok(ShellChannel { control, output }) => {
                let record = ready_record(&mut guard)?;
                record.shell = Some(control);
                tokio::spawn(forward_shell(
                    self.registry.clone(),
                    session_id.to_string(),
                    record.generation(),
                    output,
                    record.sink.clone(),
                ));
                info!(session_id, "Shell opened");
                Ok(())
            }
            Err(e) => {
                fail_session(&mut guard, &e).await;
                Err(SessionError::Channel(e.to_string()))
            }
        }
    }

    /// Forward a terminal size change. Without a shell this does nothing.
    pub async fn resize(&self, session_id: &str, size: TermSize) {
        let guard = self.registry.lock(session_id).await;
        let Some(shell) = guard.record().and_then(|r| r.shell.as_deref()) else {
            debug!(session_id, "Resize without a shell ignored");
            return;
        };
        if let Err(e) = guard.until_cancelled(shell.resize(size)).await {
            warn!(session_id, "Failed to resize shell: {e}");
        }
    }

    /// Write keystrokes to the shell.
    ///
    /// Input is dropped when there is no shell or it is not writable.
    ///
    /// # Errors
    /// Returns [`SessionError::Channel`] when the write fails; the session is
    /// torn down.
    pub async fn input(&self, session_id: &str, data: &[u8]) -> Result<(), SessionError> {
        let mut guard = self.registry.lock(session_id).await;
        let result = match guard
            .record()
            .and_then(|r| r.shell.as_deref())
            .filter(|shell| shell.is_writable())
        {
            Some(shell) => guard.until_cancelled(shell.write(data)).await,
            None => {
                debug!(session_id, len = data.len(), "Shell not writable, input dropped");
                return Ok(());
            }
        };

        if let Err(e) = result {
            fail_session(&mut guard, &e).await;
            return Err(SessionError::Channel(e.to_string()));
        }
        Ok(())
    }

    /// Tear down a session. Idempotent.
    ///
    /// Remote calls still pending on the session are cancelled rather than
    /// waited for; they fail with a cancellation error.
    pub async fn disconnect(&self, session_id: &str) -> bool {
        let removed = self.registry.remove(session_id).await;
        if removed {
            info!(session_id, "Session disconnected");
        } else {
            debug!(session_id, "Disconnect without a connection");
        }
        removed
    }

    /// Current connection state, `None` when nothing is registered.
    pub async fn state(&self, session_id: &str) -> Option<ConnectionState> {
        self.registry.state(session_id).await
    }

    /// Newline-delimited hints for a partial command.
    ///
    /// The external provider is tried first when configured; any failure
    /// falls back to the local rule table.
    ///
    /// # Errors
    /// Returns [`SessionError::Validation`] when the text is unsafe.
    pub async fn suggest(&self, text: &str) -> Result<String, SessionError> {
        if !validate_command_text(text) {
            return Err(SessionError::invalid("Invalid command text"));
        }

        if let Some(provider) = &self.suggestions {
            match provider.suggest(text).await {
                Ok(hints) if !hints.trim().is_empty() => return Ok(hints),
                Ok(_) => debug!("Suggestion provider returned nothing, using local hints"),
                Err(e) => warn!("{}, using local hints", SessionError::from(e)),
            }
        }

        Ok(local_suggestions(text)?.join("\n"))
    }
}

/// The guarded record, if it is ready for channel work.
pub(crate) fn ready_record(guard: &mut SessionGuard) -> Result<&mut SessionRecord, SessionError> {
    match guard.record_mut() {
        Some(record) if record.state() == ConnectionState::Ready => Ok(record),
        _ => Err(SessionError::NotConnected),
    }
}

/// Tear the session down after a channel failure and tell the client.
///
/// A cancelled call means a disconnect is already queued to do the teardown,
/// so the record is left for it.
pub(crate) async fn fail_session(guard: &mut SessionGuard, err: &RemoteError) {
    if matches!(err, RemoteError::Cancelled) {
        return;
    }
    if let Some(record) = guard.take() {
        record.fail().await;
    }
}

/// Copy shell output to the sink until the stream ends, then tear down.
///
/// Only the connection that opened this shell is torn down; a reconnect
/// in the meantime carries a newer generation and is left alone.
async fn forward_shell(
    registry: SessionRegistry,
    session_id: String,
    generation: u64,
    mut output: mpsc::Receiver<ShellEvent>,
    sink: OutputSink,
) {
    while let Some(event) = output.recv().await {
        let out = match event {
            ShellEvent::Data(data) => SessionOutput::Shell(data),
            ShellEvent::Error(message) => {
                warn!(session_id = %session_id, "Shell error: {message}");
                SessionOutput::ShellError(message)
            }
        };
        if sink.send(out).is_err() {
            debug!(session_id = %session_id, "Output sink closed, stopping shell forwarder");
            break;
        }
    }

    if registry.remove_generation(&session_id, generation).await {
        info!(session_id = %session_id, "Shell stream ended, session closed");
    }
}

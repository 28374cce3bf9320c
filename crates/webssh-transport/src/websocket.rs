//! WebSocket transport for browser terminals.
//!
//! Each socket is one session. Client events are handed to a per-session
//! worker that runs them strictly in arrival order; replies and session
//! output share a single writer task. A `disconnect` event skips the queue:
//! the worker and everything it still holds are dropped, the session is torn
//! down, and a fresh worker takes over.

use std::sync::Arc;

use axum::{
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use webssh_core::{SessionError, TermSize};
use webssh_session::{OutputSink, SessionManager, SessionOutput};

use crate::{
    protocol::{ClientMessage, ServerMessage, decode_data},
    upload::UploadPolicy,
};

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub uploads: Arc<UploadPolicy>,
}

impl AppState {
    #[must_use]
    pub fn new(manager: Arc<SessionManager>, uploads: UploadPolicy) -> Self {
        Self {
            manager,
            uploads: Arc::new(uploads),
        }
    }
}

/// WebSocket upgrade handler.
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let session_id = Uuid::new_v4().to_string();
    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {e}");
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Shell output and teardown notices, pushed by the session itself
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<SessionOutput>();
    let output_task = {
        let tx = tx.clone();
        tokio::spawn(async move {
            while let Some(output) = out_rx.recv().await {
                if tx.send(output.into()).is_err() {
                    break;
                }
            }
        })
    };

    let mut driver = SessionDriver::new(Arc::clone(&state.manager), &session_id, out_tx, tx.clone());

    let _ = tx.send(ServerMessage::SessionStarted {
        session_id: session_id.clone(),
    });
    info!(session_id = %session_id, "Client connected");

    while let Some(msg) = receiver.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s.into(),
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                error!(session_id = %session_id, "WebSocket error: {e}");
                break;
            }
        };

        let client_msg: ClientMessage = match serde_json::from_str(&text) {
            Ok(m) => m,
            Err(e) => {
                warn!(session_id = %session_id, "Invalid client message: {e}");
                let _ = tx.send(ServerMessage::Error {
                    message: format!("Invalid message: {e}"),
                });
                continue;
            }
        };

        if !driver.dispatch(client_msg).await {
            break;
        }
    }

    driver.shutdown().await;
    output_task.abort();
    send_task.abort();

    info!(session_id = %session_id, "Client disconnected");
}

/// Feeds one session's events to its worker.
struct SessionDriver {
    manager: Arc<SessionManager>,
    session_id: String,
    sink: OutputSink,
    tx: mpsc::UnboundedSender<ServerMessage>,
    events: mpsc::UnboundedSender<ClientMessage>,
    worker: JoinHandle<()>,
}

impl SessionDriver {
    fn new(
        manager: Arc<SessionManager>,
        session_id: &str,
        sink: OutputSink,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> Self {
        let (events, worker) = spawn_worker(&manager, session_id, &sink, &tx);
        Self {
            manager,
            session_id: session_id.to_string(),
            sink,
            tx,
            events,
            worker,
        }
    }

    /// Queue an event for the worker. Returns `false` once the worker is gone.
    ///
    /// `disconnect` is not queued: queued and in-flight events are dropped,
    /// the session is torn down, and a fresh worker is started.
    async fn dispatch(&mut self, msg: ClientMessage) -> bool {
        if !matches!(msg, ClientMessage::Disconnect) {
            return self.events.send(msg).is_ok();
        }

        self.worker.abort();
        self.manager.disconnect(&self.session_id).await;
        let _ = self.tx.send(ServerMessage::Closed);
        (self.events, self.worker) =
            spawn_worker(&self.manager, &self.session_id, &self.sink, &self.tx);
        true
    }

    /// Drop in-flight work, then tear the session down.
    async fn shutdown(self) {
        self.worker.abort();
        self.manager.disconnect(&self.session_id).await;
    }
}

fn spawn_worker(
    manager: &Arc<SessionManager>,
    session_id: &str,
    sink: &OutputSink,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) -> (mpsc::UnboundedSender<ClientMessage>, JoinHandle<()>) {
    let (events, mut event_rx) = mpsc::unbounded_channel::<ClientMessage>();
    let manager = Arc::clone(manager);
    let session_id = session_id.to_string();
    let sink = sink.clone();
    let tx = tx.clone();
    let worker = tokio::spawn(async move {
        while let Some(msg) = event_rx.recv().await {
            let kind = msg.kind();
            debug!(session_id = %session_id, kind, "Handling event");
            if let Err(e) = handle_message(&manager, &session_id, msg, &sink, &tx).await {
                warn!(session_id = %session_id, kind, "Event failed: {e}");
                let _ = tx.send(ServerMessage::error(e));
            }
        }
    });
    (events, worker)
}

/// Run one client event to completion.
///
/// Replies go to `tx`; `sink` is handed to the session on connect.
///
/// # Errors
/// Returns the session error to report to the client.
pub async fn handle_message(
    manager: &SessionManager,
    session_id: &str,
    msg: ClientMessage,
    sink: &OutputSink,
    tx: &mpsc::UnboundedSender<ServerMessage>,
) -> Result<(), SessionError> {
    let reply = match msg {
        ClientMessage::Connect(request) => {
            let connected = manager.connect(session_id, request, sink.clone()).await?;
            let _ = tx.send(connected.into());
            manager.open_shell(session_id).await?;
            ServerMessage::ShellReady
        }
        ClientMessage::List { path } => {
            let files = manager.list_files(session_id, &path).await?;
            ServerMessage::FileList { path, files }
        }
        ClientMessage::Read { path } => {
            let content = manager.read_file(session_id, &path).await?;
            ServerMessage::FileContent { path, content }
        }
        ClientMessage::Write { path, content } => {
            manager.write_file(session_id, &path, &content).await?;
            ServerMessage::FileSaved { path }
        }
        ClientMessage::Mkdir { path } => {
            manager.create_directory(session_id, &path).await?;
            ServerMessage::DirectoryCreated { path }
        }
        ClientMessage::Delete { path } => {
            manager.delete_file(session_id, &path).await?;
            ServerMessage::FileDeleted { path }
        }
        ClientMessage::Download { path } => manager.download_file(session_id, &path).await?.into(),
        ClientMessage::ShellInput { data } => {
            let data = decode_data(&data)
                .ok_or_else(|| SessionError::invalid("Shell input must be base64"))?;
            manager.input(session_id, &data).await?;
            return Ok(());
        }
        ClientMessage::ShellResize { rows, cols } => {
            manager.resize(session_id, TermSize { cols, rows }).await;
            return Ok(());
        }
        ClientMessage::Suggest { command } => ServerMessage::Suggestions {
            suggestions: manager.suggest(&command).await?,
        },
        ClientMessage::Disconnect => {
            manager.disconnect(session_id).await;
            ServerMessage::Closed
        }
        ClientMessage::Ping => ServerMessage::Pong,
    };

    let _ = tx.send(reply);
    Ok(())
}

//! Wire protocol for client-server communication.

use std::fmt;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use webssh_core::{ConnectRequest, FileEntry};
use webssh_session::{Connected, Downloaded, SessionOutput};

/// Decode a base64 data field.
#[must_use]
pub fn decode_data(data: &str) -> Option<Vec<u8>> {
    BASE64.decode(data).ok()
}

/// Message from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Open an SSH connection and its shell.
    Connect(ConnectRequest),
    /// List a remote directory.
    List { path: String },
    /// Read a remote file as text.
    Read { path: String },
    /// Write text to a remote file.
    Write { path: String, content: String },
    /// Create a remote directory.
    Mkdir { path: String },
    /// Delete a remote file.
    Delete { path: String },
    /// Stage a remote file for HTTP download.
    Download { path: String },
    /// Terminal input data (base64 encoded).
    ShellInput { data: String },
    /// Resize terminal.
    ShellResize { rows: u16, cols: u16 },
    /// Ask for hints about a partial command.
    Suggest { command: String },
    /// Close the SSH connection.
    Disconnect,
    /// Ping for keepalive.
    Ping,
}

impl ClientMessage {
    /// Create an input message from raw bytes.
    #[must_use]
    pub fn shell_input(data: &[u8]) -> Self {
        Self::ShellInput {
            data: BASE64.encode(data),
        }
    }

    /// Decode input data from base64.
    #[must_use]
    pub fn decode_input(&self) -> Option<Vec<u8>> {
        if let Self::ShellInput { data } = self {
            decode_data(data)
        } else {
            None
        }
    }

    /// Event name, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connect(_) => "connect",
            Self::List { .. } => "list",
            Self::Read { .. } => "read",
            Self::Write { .. } => "write",
            Self::Mkdir { .. } => "mkdir",
            Self::Delete { .. } => "delete",
            Self::Download { .. } => "download",
            Self::ShellInput { .. } => "shellInput",
            Self::ShellResize { .. } => "shellResize",
            Self::Suggest { .. } => "suggest",
            Self::Disconnect => "disconnect",
            Self::Ping => "ping",
        }
    }
}

/// Message from server to client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    /// Socket accepted; the id addresses this session over HTTP.
    SessionStarted { session_id: String },
    /// SSH connection is ready.
    Connected { host: String, username: String },
    /// The interactive shell is open.
    ShellReady,
    /// Terminal output data (base64 encoded).
    ShellOutput { data: String },
    FileList { path: String, files: Vec<FileEntry> },
    FileContent { path: String, content: String },
    FileSaved { path: String },
    DirectoryCreated { path: String },
    FileDeleted { path: String },
    DownloadComplete { file_name: String, download_path: String },
    UploadComplete { file_name: String, path: String },
    /// Newline-delimited command hints.
    Suggestions { suggestions: String },
    /// The SSH connection is gone.
    Closed,
    /// Error message.
    Error { message: String },
    /// Pong response.
    Pong,
}

impl ServerMessage {
    /// Create an output message from raw bytes.
    #[must_use]
    pub fn shell_output(data: &[u8]) -> Self {
        Self::ShellOutput {
            data: BASE64.encode(data),
        }
    }

    /// Decode output data from base64.
    #[must_use]
    pub fn decode_output(&self) -> Option<Vec<u8>> {
        if let Self::ShellOutput { data } = self {
            decode_data(data)
        } else {
            None
        }
    }

    pub fn error(message: impl fmt::Display) -> Self {
        Self::Error {
            message: message.to_string(),
        }
    }
}

impl From<SessionOutput> for ServerMessage {
    fn from(output: SessionOutput) -> Self {
        match output {
            SessionOutput::Shell(data) => Self::shell_output(&data),
            SessionOutput::ShellError(message) => Self::Error {
                message: format!("Shell error: {message}"),
            },
            SessionOutput::UploadComplete { file_name, path } => {
                Self::UploadComplete { file_name, path }
            }
            SessionOutput::Closed => Self::Closed,
        }
    }
}

impl From<Connected> for ServerMessage {
    fn from(connected: Connected) -> Self {
        Self::Connected {
            host: connected.host,
            username: connected.username,
        }
    }
}

impl From<Downloaded> for ServerMessage {
    fn from(downloaded: Downloaded) -> Self {
        Self::DownloadComplete {
            file_name: downloaded.file_name,
            download_path: downloaded.download_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use webssh_core::{AuthMethod, FileKind};

    use super::*;

    #[test]
    fn test_shell_data_is_base64() {
        let msg = ClientMessage::shell_input(b"ls -la\r");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, json!({"type": "shellInput", "data": "bHMgLWxhDQ=="}));
        assert_eq!(msg.decode_input().unwrap(), b"ls -la\r");

        let out = ServerMessage::from(SessionOutput::Shell(vec![0x1b, b'[', b'H']));
        assert_eq!(out.decode_output().unwrap(), vec![0x1b, b'[', b'H']);
    }

    #[test]
    fn test_upload_complete_carries_full_remote_path() {
        let msg = ServerMessage::from(SessionOutput::UploadComplete {
            file_name: "run.sh".into(),
            path: "/tmp/run.sh".into(),
        });
        assert_eq!(
            serde_json::to_value(&msg).unwrap(),
            json!({ "type": "uploadComplete", "fileName": "run.sh", "path": "/tmp/run.sh" })
        );
    }

    #[test]
    fn test_connect_payload() {
        let msg: ClientMessage = serde_json::from_value(json!({
            "type": "connect",
            "host": "10.0.0.5",
            "port": "2222",
            "username": "ops",
            "authType": "password",
            "password": "hunter2"
        }))
        .unwrap();

        let ClientMessage::Connect(request) = msg else {
            panic!("expected connect");
        };
        let params = request.into_params().unwrap();
        assert_eq!(params.port, 2222);
        assert_eq!(
            params.auth,
            AuthMethod::Password {
                password: "hunter2".into()
            }
        );
    }

    #[test]
    fn test_event_names() {
        let resize: ClientMessage =
            serde_json::from_str(r#"{"type":"shellResize","rows":40,"cols":120}"#).unwrap();
        assert!(matches!(resize, ClientMessage::ShellResize { rows: 40, cols: 120 }));
        assert_eq!(resize.kind(), "shellResize");

        let disconnect: ClientMessage = serde_json::from_str(r#"{"type":"disconnect"}"#).unwrap();
        assert!(matches!(disconnect, ClientMessage::Disconnect));
    }

    #[test]
    fn test_unknown_event_is_rejected() {
        let err = serde_json::from_str::<ClientMessage>(r#"{"type":"format-disk"}"#).unwrap_err();
        assert!(err.to_string().contains("unknown variant"), "{err}");
        assert!(serde_json::from_str::<ClientMessage>("not json").is_err());
    }

    #[test]
    fn test_server_message_shapes() {
        let download = ServerMessage::from(Downloaded {
            file_name: "app.log".into(),
            download_path: "/downloads/app.log".into(),
        });
        assert_eq!(
            serde_json::to_value(&download).unwrap(),
            json!({
                "type": "downloadComplete",
                "fileName": "app.log",
                "downloadPath": "/downloads/app.log"
            })
        );

        let list = ServerMessage::FileList {
            path: "/".into(),
            files: vec![FileEntry {
                name: "tmp".into(),
                kind: FileKind::Directory,
                size: 4096,
                modified_at: 0,
                permissions: "drwxrwxrwx".into(),
            }],
        };
        let json = serde_json::to_value(&list).unwrap();
        assert_eq!(json["type"], "fileList");
        assert_eq!(json["files"][0]["type"], "directory");

        assert_eq!(
            serde_json::to_value(ServerMessage::SessionStarted {
                session_id: "abc".into()
            })
            .unwrap(),
            json!({"type": "sessionStarted", "sessionId": "abc"})
        );
        assert_eq!(
            serde_json::to_value(ServerMessage::ShellReady).unwrap(),
            json!({"type": "shellReady"})
        );
    }
}

//! Per-session output sink.

use tokio::sync::mpsc;

/// Something pushed to a session outside of a request/response exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    /// Shell bytes, verbatim.
    Shell(Vec<u8>),
    /// The shell channel reported an error.
    ShellError(String),
    /// A file relayed through the upload endpoint reached the remote host.
    UploadComplete { file_name: String, path: String },
    /// The session was torn down by the remote side or a channel failure.
    Closed,
}

/// Sender half of a session's output stream.
pub type OutputSink = mpsc::UnboundedSender<SessionOutput>;

//! Core building blocks for webssh sessions.
//!
//! This crate provides:
//! - `validation` - Pure predicates for connection parameters, paths and command text
//! - `ConnectRequest` / `ConnectParams` - Untrusted connect payload and its validated form
//! - `RemoteConnector`, `RemoteHandle`, `ShellControl`, `FileSubsystem` - Remote capability traits
//! - `SessionError` - The error taxonomy surfaced to clients
//! - `local_suggestions` - Rule-based command hints

pub mod error;
pub mod params;
pub mod remote;
pub mod suggest;
pub mod validation;

pub use error::{FileOp, RemoteError, SessionError, SuggestionError};
pub use params::{AuthMethod, ConnectParams, ConnectRequest};
pub use remote::{
    FileEntry, FileKind, FileSubsystem, RemoteConnector, RemoteHandle, ShellChannel, ShellControl,
    ShellEvent, TermSize,
};
pub use suggest::{SuggestionProvider, local_suggestions};
pub use validation::{validate_command_text, validate_connection_params, validate_path};

/// Session identifier, supplied by the transport.
pub type SessionId = String;

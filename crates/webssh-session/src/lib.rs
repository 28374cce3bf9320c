//! Session orchestration for webssh.
//!
//! Provides:
//! - `SessionRegistry` - Per-session exclusive access to connection records
//! - `SessionManager` - Connection lifecycle, shell proxying and file operations

pub mod files;
pub mod manager;
pub mod output;
pub mod record;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

pub use files::Downloaded;
pub use manager::{Connected, SessionConfig, SessionManager};
pub use output::{OutputSink, SessionOutput};
pub use record::{ConnectionState, SessionRecord};
pub use registry::{SessionGuard, SessionRegistry};

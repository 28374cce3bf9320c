//! Transport layer for browser clients.
//!
//! Provides:
//! - Wire protocol (JSON events, base64 terminal data)
//! - WebSocket transport, upload endpoint and router (feature: websocket)

pub mod protocol;

#[cfg(feature = "websocket")]
pub mod router;
#[cfg(feature = "websocket")]
pub mod upload;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{ClientMessage, ServerMessage};

#[cfg(feature = "websocket")]
pub use router::create_router;
#[cfg(feature = "websocket")]
pub use upload::UploadPolicy;
#[cfg(feature = "websocket")]
pub use websocket::AppState;

//! Interview chat over WebSocket.

pub mod protocol;
mod registry;
pub mod session;
pub mod templates;
mod websocket;

pub use protocol::{parse_inbound, Command, FrameKind, Inbound, OutboundFrame};
pub use registry::{ConnectionId, ConnectionRegistry};
pub use session::{ChatSession, Rejection, Turn, CLOSE_NORMAL, CLOSE_POLICY_VIOLATION};
pub use websocket::{ws_handler, WsParams};

mod connection;
mod signaling;

pub use connection::{ConnectionId, Role};
pub use signaling::{ClientMessage, ServerMessage};

pub mod config;
pub mod coordinator;
pub mod signaling;

pub use config::ServerConfig;
pub use coordinator::{Coordinator, CoordinatorCommand};
pub use signaling::{SignalSink, SignalingService, ws_handler};

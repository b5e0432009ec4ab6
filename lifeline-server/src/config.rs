use clap::Parser;
use std::net::{IpAddr, SocketAddr};

/// Signaling coordinator for live emergency streams.
#[derive(Debug, Clone, Parser)]
#[command(name = "lifeline-server")]
pub struct ServerConfig {
    /// Address to bind the WebSocket endpoint on.
    #[arg(long, default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on.
    #[arg(long, default_value_t = 8080)]
    pub port: u16,
}

impl ServerConfig {
    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
    }
}

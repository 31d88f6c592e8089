//! Client configuration.

use peerlink_core::SessionConfig;
use peerlink_protocol::DEFAULT_PORT;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Connection and transfer settings for a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Rendezvous server address.
    pub server_addr: SocketAddr,
    /// Display name announced in the handshake.
    pub name: String,
    /// Port this client's peer listener binds to. Announced in
    /// handshakes and used for roster self-suppression.
    pub listen_port: u16,
    /// Where incoming files land.
    pub download_dir: PathBuf,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Session settings for accepted peer connections.
    pub session: SessionConfig,
}

impl ClientConfig {
    pub fn new(server_addr: SocketAddr, name: impl Into<String>) -> Self {
        Self {
            server_addr,
            name: name.into(),
            listen_port: DEFAULT_PORT,
            download_dir: PathBuf::from("./downloads"),
            connect_timeout: Duration::from_secs(10),
            session: SessionConfig::default(),
        }
    }

    pub fn with_listen_port(mut self, port: u16) -> Self {
        self.listen_port = port;
        self
    }

    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = dir.into();
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_and_overrides() {
        let addr: SocketAddr = "127.0.0.1:7805".parse().unwrap();
        let config = ClientConfig::new(addr, "alice");
        assert_eq!(config.listen_port, DEFAULT_PORT);
        assert_eq!(config.download_dir, PathBuf::from("./downloads"));

        let config = config
            .with_listen_port(9000)
            .with_download_dir("/tmp/dl")
            .with_connect_timeout(Duration::from_secs(2));
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.download_dir, PathBuf::from("/tmp/dl"));
        assert_eq!(config.connect_timeout, Duration::from_secs(2));
    }
}

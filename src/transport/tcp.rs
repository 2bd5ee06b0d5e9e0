//! TCP connector implementation
//!
//! Dials plain TCP connections to CONNECT destinations.

use super::{Connector, OutboundStream, SocketOpts};
use crate::config::TcpConfig;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;

/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// TCP connector for plain connections
#[derive(Debug, Clone)]
pub struct TcpConnector {
    /// Socket options to apply to connections
    socket_opts: SocketOpts,
    /// Connection timeout
    connect_timeout: Duration,
}

impl Default for TcpConnector {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl TcpConnector {
    /// Create a new TCP connector with default options
    pub fn with_defaults() -> Self {
        TcpConnector {
            socket_opts: SocketOpts::default(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }

    /// Create a TCP connector from TCP config
    pub fn from_config(config: &TcpConfig) -> Self {
        TcpConnector {
            socket_opts: SocketOpts::from_tcp_config(config),
            connect_timeout: Duration::from_secs(config.connect_timeout),
        }
    }

    /// Set socket options
    pub fn with_socket_opts(mut self, opts: SocketOpts) -> Self {
        self.socket_opts = opts;
        self
    }

    /// Set connection timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn dial(&self, addr: SocketAddr) -> io::Result<Box<dyn OutboundStream>> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("Connection timeout to {}", addr),
                )
            })??;

        if let Err(e) = self.socket_opts.apply(&stream) {
            tracing::warn!("Failed to apply socket options: {}", e);
        }

        tracing::debug!("TCP connection established to {}", addr);

        Ok(Box::new(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplyCode;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[test]
    fn test_tcp_connector_with_defaults() {
        let connector = TcpConnector::with_defaults();
        assert!(connector.socket_opts.nodelay);
        assert_eq!(connector.connect_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_tcp_connector_with_socket_opts() {
        let opts = SocketOpts {
            nodelay: false,
            keepalive_secs: Some(60),
            keepalive_interval: Some(20),
        };
        let connector = TcpConnector::with_defaults().with_socket_opts(opts.clone());
        assert_eq!(connector.socket_opts, opts);
    }

    #[test]
    fn test_tcp_connector_with_connect_timeout() {
        let connector = TcpConnector::with_defaults().with_connect_timeout(Duration::from_millis(250));
        assert_eq!(connector.connect_timeout, Duration::from_millis(250));
        assert!(connector.socket_opts.nodelay);
    }

    #[test]
    fn test_tcp_connector_from_config() {
        let config = TcpConfig {
            nodelay: true,
            keepalive_secs: 30,
            keepalive_interval: 10,
            connect_timeout: 3,
        };
        let connector = TcpConnector::from_config(&config);
        assert_eq!(connector.connect_timeout, Duration::from_secs(3));
        assert_eq!(connector.socket_opts.keepalive_secs, Some(30));
    }

    #[tokio::test]
    async fn test_tcp_connector_dial_localhost() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            stream.write_all(b"hi").await.unwrap();
        });

        let mut stream = TcpConnector::with_defaults().dial(addr).await.unwrap();
        let mut buf = [0u8; 2];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
        assert!(stream.local_addr().unwrap().ip().is_loopback());

        accept.await.unwrap();
    }

    #[tokio::test]
    async fn test_tcp_connector_dial_refused() {
        // Grab a free port, then close the listener so nothing is there
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = TcpConnector::with_defaults().dial(addr).await.unwrap_err();
        assert_eq!(ReplyCode::from(&err), ReplyCode::ConnectionRefused);
    }
}

//! # Crabproxy - SOCKS5 Proxy Engine
//!
//! Crabproxy is a SOCKS5 (RFC 1928) proxy server with optional
//! username/password authentication (RFC 1929). It negotiates
//! authentication, parses the relay request, applies pluggable admission
//! rules, resolves and optionally rewrites the destination, dials it and
//! relays bytes in both directions.
//!
//! ## Features
//!
//! - **Pluggable authentication**: "no authentication", username/password
//!   and custom methods, selected in the client's order of preference
//! - **Rules**: per-command allow/deny and destination name patterns
//! - **Admission filters**: peer IP and CIDR allow-lists checked at accept time
//! - **Graceful shutdown**: stop accepting and drain live connections
//!
//! BIND and UDP ASSOCIATE are always answered with "command not supported".
//!
//! ## Usage
//!
//! ```rust,ignore
//! use crabproxy::server::ServerBuilder;
//! use crabproxy::socks::StaticCredentials;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let server = ServerBuilder::new()
//!         .credentials(Arc::new(StaticCredentials::new().with_user("user", "pass")))
//!         .build()?;
//!     let shutdown = server.shutdown_handle();
//!
//!     tokio::spawn(async move {
//!         let _ = tokio::signal::ctrl_c().await;
//!         shutdown.stop(true).await;
//!     });
//!
//!     server.listen_and_serve("127.0.0.1:1080").await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! accept -> admission filter -> version -> auth -> request -> resolve
//!        -> rewrite -> rules -> dial -> reply -> relay
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod server;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, Config};
pub use error::{CrabProxyError, ReplyCode, Socks5Error};
pub use server::{Server, ServerBuilder, ShutdownHandle};

/// Version of the Crabproxy library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_name() {
        assert_eq!(NAME, "crabproxy");
    }
}

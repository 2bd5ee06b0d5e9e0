//! Name resolution for domain-name destinations

use async_trait::async_trait;
use std::fmt::Debug;
use std::io;
use std::net::IpAddr;

/// Resolves a domain name to a single IP address
#[async_trait]
pub trait NameResolver: Send + Sync + Debug {
    /// Resolve `name`
    async fn resolve(&self, name: &str) -> io::Result<IpAddr>;
}

/// Resolver backed by the system's name resolution
#[derive(Debug, Clone, Copy, Default)]
pub struct DnsResolver;

#[async_trait]
impl NameResolver for DnsResolver {
    async fn resolve(&self, name: &str) -> io::Result<IpAddr> {
        tokio::net::lookup_host((name, 0))
            .await?
            .next()
            .map(|addr| addr.ip())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("No addresses found for domain: {}", name),
                )
            })
    }
}

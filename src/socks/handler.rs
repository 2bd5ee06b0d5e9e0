//! Main SOCKS5 handler
//!
//! This module drives a single client session: version check,
//! authentication, request parsing, resolution, rewriting, rule
//! enforcement and command dispatch.

use super::auth::{authenticate, AuthRegistry, Authenticator};
use super::command::{read_addr_spec, read_request_header, send_command_not_supported, send_reply};
use super::consts::SOCKS5_VERSION;
use super::resolver::{DnsResolver, NameResolver};
use super::rewriter::AddressRewriter;
use super::rules::{PermitAll, RuleSet};
use super::tcp_relay::handle_connect;
use super::types::{AddrSpec, AuthContext, Command, Request};
use crate::error::{ReplyCode, Socks5Error};
use crate::transport::{Connector, TcpConnector};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, BufReader};
use tracing::{debug, info, warn};

/// Fully-populated, immutable engine configuration shared by all sessions
#[derive(Debug)]
pub struct Settings {
    /// Negotiable authentication methods
    pub auth: AuthRegistry,
    /// Resolver for domain-name destinations
    pub resolver: Arc<dyn NameResolver>,
    /// Per-request admission policy
    pub rules: Arc<dyn RuleSet>,
    /// Optional destination rewriting
    pub rewriter: Option<Arc<dyn AddressRewriter>>,
    /// Outbound dialer for CONNECT
    pub connector: Arc<dyn Connector>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            auth: AuthRegistry::new([Authenticator::NoAuth]),
            resolver: Arc::new(DnsResolver),
            rules: Arc::new(PermitAll),
            rewriter: None,
            connector: Arc::new(TcpConnector::with_defaults()),
        }
    }
}

/// Per-connection SOCKS5 state machine
#[derive(Debug, Clone)]
pub struct ConnectionHandler {
    settings: Arc<Settings>,
}

impl ConnectionHandler {
    /// Create a handler over shared settings
    pub fn new(settings: Arc<Settings>) -> Self {
        ConnectionHandler { settings }
    }

    /// Serve one client stream until the session ends
    ///
    /// # Protocol Flow
    ///
    /// 1. Version byte (a mismatch aborts without writing anything)
    /// 2. Method negotiation and authentication
    /// 3. Request header and destination address
    /// 4. Name resolution and rewriting
    /// 5. Rule check
    /// 6. Command execution (CONNECT relays, BIND and ASSOCIATE are refused)
    pub async fn serve<S>(&self, stream: S, remote_addr: SocketAddr) -> Result<(), Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let mut stream = BufReader::new(stream);

        let version = stream.read_u8().await?;
        if version != SOCKS5_VERSION {
            return Err(Socks5Error::UnsupportedVersion(version));
        }

        let auth = authenticate(&mut stream, &self.settings.auth).await?;
        debug!(
            "Authentication completed for {} with method {:#04x}",
            remote_addr, auth.method
        );

        self.handle_request(stream, remote_addr, auth).await
    }

    async fn handle_request<S>(
        &self,
        mut stream: BufReader<S>,
        remote_addr: SocketAddr,
        auth: AuthContext,
    ) -> Result<(), Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let command_byte = read_request_header(&mut stream).await?;

        let requested = match read_addr_spec(&mut stream).await {
            Ok(addr) => addr,
            Err(Socks5Error::AddressTypeNotSupported(addr_type)) => {
                if let Err(e) = send_reply(&mut stream, ReplyCode::AddrTypeNotSupported, None).await {
                    debug!("Failed to send address type reply: {}", e);
                }
                return Err(Socks5Error::AddressTypeNotSupported(addr_type));
            }
            Err(Socks5Error::InvalidDomain(name)) => {
                if let Err(e) = send_reply(&mut stream, ReplyCode::HostUnreachable, None).await {
                    debug!("Failed to send host unreachable reply: {}", e);
                }
                return Err(Socks5Error::InvalidDomain(name));
            }
            Err(e) => return Err(e),
        };

        let command = match Command::from_byte(command_byte) {
            Some(command) => command,
            None => {
                send_command_not_supported(&mut stream).await?;
                return Err(Socks5Error::CommandNotSupported(command_byte));
            }
        };

        let mut dest = requested.clone();
        self.resolve_dest(&mut stream, &mut dest).await?;

        let mut request = Request {
            command,
            dest_addr: dest,
            requested_addr: requested,
            remote_addr,
            auth,
        };

        if let Some(rewriter) = &self.settings.rewriter {
            let mut rewritten = rewriter.rewrite(&request);
            debug!("Rewrote {} to {}", request.requested_addr, rewritten);
            self.resolve_dest(&mut stream, &mut rewritten).await?;
            request.dest_addr = rewritten;
        }

        if !self.settings.rules.allow(&request) {
            send_reply(&mut stream, ReplyCode::RuleFailure, Some(&request.dest_addr)).await?;
            return Err(Socks5Error::BlockedByRules {
                command,
                dest: request.requested_addr.to_string(),
            });
        }

        info!(
            "SOCKS5 {} request from {} to {}",
            command, remote_addr, request.dest_addr
        );

        match command {
            Command::Connect => {
                handle_connect(stream, &request, self.settings.connector.as_ref()).await
            }
            Command::Bind | Command::Associate => {
                warn!("{} command not supported", command);
                send_command_not_supported(&mut stream).await
            }
        }
    }

    /// Resolve a destination that carries only a domain name
    ///
    /// Replies "host unreachable" when the lookup fails.
    async fn resolve_dest<S>(
        &self,
        stream: &mut BufReader<S>,
        addr: &mut AddrSpec,
    ) -> Result<(), Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let name = match (&addr.ip, &addr.fqdn) {
            (None, Some(name)) => name.clone(),
            _ => return Ok(()),
        };

        match self.settings.resolver.resolve(&name).await {
            Ok(ip) => {
                addr.ip = Some(ip);
                Ok(())
            }
            Err(source) => {
                send_reply(stream, ReplyCode::HostUnreachable, None).await?;
                Err(Socks5Error::ResolveFailed { name, source })
            }
        }
    }
}

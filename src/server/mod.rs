//! Listener lifecycle for Crabproxy
//!
//! A [`Server`] is built once through [`ServerBuilder`], owns the immutable
//! engine [`Settings`] and the [`AdmissionFilter`], and spawns one
//! [`ConnectionHandler`] task per accepted connection. A [`ShutdownHandle`]
//! stops the accept loop, optionally draining live connections first.

mod filter;
mod tracker;

pub use filter::{AdmissionFilter, Cidr, CidrParseError};
pub use tracker::{ConnectionGuard, ConnectionTracker};

use crate::error::{CrabProxyError, Socks5Error};
use crate::socks::{
    AddressRewriter, AuthRegistry, Authenticator, ConnectionHandler, CredentialStore,
    DnsResolver, NameResolver, PermitAll, RuleSet, Settings, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE,
};
use crate::transport::{Connector, TcpConnector};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// How long a single accept waits before the loop re-checks for shutdown
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Back-off after a failed accept
const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// Collects the collaborators of a [`Server`]
///
/// Anything left unset falls back to a default in [`ServerBuilder::build`]:
/// "no authentication" (or username/password when credentials were given),
/// [`DnsResolver`], [`PermitAll`] and [`TcpConnector`].
#[derive(Debug, Default)]
pub struct ServerBuilder {
    auth_methods: Vec<Authenticator>,
    credentials: Option<Arc<dyn CredentialStore>>,
    resolver: Option<Arc<dyn NameResolver>>,
    rules: Option<Arc<dyn RuleSet>>,
    rewriter: Option<Arc<dyn AddressRewriter>>,
    connector: Option<Arc<dyn Connector>>,
    filter: AdmissionFilter,
}

impl ServerBuilder {
    /// Create an empty builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an authentication method
    pub fn auth_method(mut self, method: Authenticator) -> Self {
        self.auth_methods.push(method);
        self
    }

    /// Enable username/password authentication against `store`
    pub fn credentials(mut self, store: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(store);
        self
    }

    /// Use a custom name resolver
    pub fn resolver(mut self, resolver: Arc<dyn NameResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    /// Use a custom rule set
    pub fn rules(mut self, rules: Arc<dyn RuleSet>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Rewrite destinations before rules and dialing
    pub fn rewriter(mut self, rewriter: Arc<dyn AddressRewriter>) -> Self {
        self.rewriter = Some(rewriter);
        self
    }

    /// Use a custom outbound dialer
    pub fn connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = Some(connector);
        self
    }

    /// Only admit peers with this address (or another allowed one)
    pub fn allow_ip(mut self, ip: IpAddr) -> Self {
        self.filter.allow_ip(ip);
        self
    }

    /// Only admit peers inside this network (or another allowed one)
    pub fn allow_net(mut self, net: Cidr) -> Self {
        self.filter.allow_net(net);
        self
    }

    /// Validate the collected parts and produce a server
    pub fn build(self) -> Result<Server, CrabProxyError> {
        let mut methods = self.auth_methods;

        if methods
            .iter()
            .any(|method| method.code() == SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE)
        {
            return Err(CrabProxyError::Config(format!(
                "authentication method code {:#04x} is reserved",
                SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE
            )));
        }

        if let Some(store) = self.credentials {
            if !methods
                .iter()
                .any(|method| matches!(method, Authenticator::UserPass(_)))
            {
                methods.push(Authenticator::UserPass(store));
            }
        }
        if methods.is_empty() {
            methods.push(Authenticator::NoAuth);
        }

        let auth = AuthRegistry::new(methods);
        debug!("Registered authentication methods: {:?}", auth.codes());

        let settings = Settings {
            auth,
            resolver: self.resolver.unwrap_or_else(|| Arc::new(DnsResolver)),
            rules: self.rules.unwrap_or_else(|| Arc::new(PermitAll)),
            rewriter: self.rewriter,
            connector: self
                .connector
                .unwrap_or_else(|| Arc::new(TcpConnector::with_defaults())),
        };

        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        Ok(Server {
            settings: Arc::new(settings),
            filter: self.filter,
            tracker: ConnectionTracker::new(),
            shutdown_tx,
            shutdown_rx,
        })
    }
}

struct ShutdownRequest {
    wait: bool,
    done: oneshot::Sender<()>,
}

impl std::fmt::Debug for ShutdownRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownRequest")
            .field("wait", &self.wait)
            .finish()
    }
}

/// Stops a running [`Server`]
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: mpsc::Sender<ShutdownRequest>,
}

impl ShutdownHandle {
    /// Stop accepting connections and release the listener.
    ///
    /// With `wait`, the listener is only released once every live
    /// connection has finished. Returns after the accept loop is done, or
    /// immediately if the server has already been dropped.
    pub async fn stop(&self, wait: bool) {
        let (done, done_rx) = oneshot::channel();
        if self.tx.send(ShutdownRequest { wait, done }).await.is_err() {
            return;
        }
        let _ = done_rx.await;
    }
}

/// A SOCKS5 server
#[derive(Debug)]
pub struct Server {
    settings: Arc<Settings>,
    filter: AdmissionFilter,
    tracker: ConnectionTracker,
    shutdown_tx: mpsc::Sender<ShutdownRequest>,
    shutdown_rx: mpsc::Receiver<ShutdownRequest>,
}

impl Server {
    /// Shortcut for [`ServerBuilder::new`]
    pub fn builder() -> ServerBuilder {
        ServerBuilder::new()
    }

    /// Handle for stopping this server once it is serving
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            tx: self.shutdown_tx.clone(),
        }
    }

    /// Tracker of connections currently being served
    pub fn tracker(&self) -> &ConnectionTracker {
        &self.tracker
    }

    /// Bind `addr` and serve until stopped
    pub async fn listen_and_serve<A: ToSocketAddrs>(self, addr: A) -> Result<(), CrabProxyError> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve a single client stream.
    ///
    /// Admission filters are not applied here; they guard the listener.
    pub async fn serve_connection<S>(&self, stream: S, peer: SocketAddr) -> Result<(), Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let _guard = self.tracker.guard();
        ConnectionHandler::new(self.settings.clone())
            .serve(stream, peer)
            .await
    }

    /// Accept connections on `listener` until a [`ShutdownHandle`] stops the server
    pub async fn serve(self, listener: TcpListener) -> Result<(), CrabProxyError> {
        let Server {
            settings,
            filter,
            tracker,
            shutdown_tx,
            mut shutdown_rx,
        } = self;
        // Only handles keep the channel open from here on
        drop(shutdown_tx);

        info!("Listening on {}", listener.local_addr()?);

        let request = loop {
            tokio::select! {
                biased;

                Some(request) = shutdown_rx.recv() => break request,

                accepted = tokio::time::timeout(ACCEPT_POLL_INTERVAL, listener.accept()) => {
                    let (stream, peer) = match accepted {
                        Err(_) => continue,
                        Ok(Ok(conn)) => conn,
                        Ok(Err(e)) => {
                            warn!("Failed to accept connection: {}", e);
                            tokio::time::sleep(ACCEPT_ERROR_BACKOFF).await;
                            continue;
                        }
                    };

                    if !filter.admits(peer.ip()) {
                        warn!("Rejected connection from {}", peer);
                        continue;
                    }

                    info!("Accepted connection from {}", peer);

                    let guard = tracker.guard();
                    let handler = ConnectionHandler::new(settings.clone());
                    tokio::spawn(async move {
                        let _guard = guard;
                        match handler.serve(stream, peer).await {
                            Ok(()) => info!("Connection from {} closed", peer),
                            Err(e) => error!("Connection from {} failed: {}", peer, e),
                        }
                    });
                }
            }
        };

        if request.wait {
            info!(
                "Shutting down, waiting for {} live connection(s)",
                tracker.live()
            );
            tracker.wait_idle().await;
        } else {
            info!("Shutting down without waiting for live connections");
        }

        drop(listener);
        let _ = request.done.send(());
        info!("Server stopped");

        Ok(())
    }
}

//! Test utilities and mocks for Crabproxy
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use crabproxy::error::CrabProxyError;
use crabproxy::server::{ServerBuilder, ShutdownHandle};
use crabproxy::socks::{read_addr_spec, AddrSpec, NameResolver};
use std::collections::HashMap;
use std::io;
use std::net::{IpAddr, SocketAddr};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Start a TCP echo service and return its address
pub async fn spawn_echo_server() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;

    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });

    addr
}

/// A running proxy under test
pub struct TestServer {
    /// Proxy address
    pub addr: SocketAddr,
    /// Handle stopping the proxy
    pub shutdown: ShutdownHandle,
    /// The accept loop task
    pub task: JoinHandle<Result<(), CrabProxyError>>,
}

/// Build the server and serve it on a fresh loopback listener
pub async fn start_server(builder: ServerBuilder) -> TestServer {
    let server = builder.build().unwrap();
    let shutdown = server.shutdown_handle();
    let (listener, addr) = create_test_listener().await;
    let task = tokio::spawn(server.serve(listener));

    TestServer {
        addr,
        shutdown,
        task,
    }
}

/// Resolver answering from a fixed table
#[derive(Debug, Default)]
pub struct StaticResolver {
    hosts: HashMap<String, IpAddr>,
}

impl StaticResolver {
    /// Add a host entry
    pub fn with_host(mut self, name: &str, ip: IpAddr) -> Self {
        self.hosts.insert(name.to_string(), ip);
        self
    }
}

#[async_trait]
impl NameResolver for StaticResolver {
    async fn resolve(&self, name: &str) -> io::Result<IpAddr> {
        self.hosts
            .get(name)
            .copied()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, format!("unknown host: {}", name)))
    }
}

/// Read a reply frame, returning the reply code and bind address
pub async fn read_reply(stream: &mut TcpStream) -> (u8, AddrSpec) {
    let mut head = [0u8; 3];
    stream.read_exact(&mut head).await.unwrap();
    assert_eq!(head[0], 0x05);
    assert_eq!(head[2], 0x00);

    let bind = read_addr_spec(stream).await.unwrap();
    (head[1], bind)
}

/// Negotiate "no authentication" on a fresh connection to the proxy
pub async fn connect_no_auth(proxy: SocketAddr) -> TcpStream {
    let mut stream = TcpStream::connect(proxy).await.unwrap();
    stream
        .write_all(&socks5_mock::create_auth_request_no_auth())
        .await
        .unwrap();

    let mut method = [0u8; 2];
    stream.read_exact(&mut method).await.unwrap();
    assert_eq!(method, [0x05, 0x00]);
    stream
}

/// Open a CONNECT tunnel to `target` and return the stream after the success reply
pub async fn open_tunnel(proxy: SocketAddr, target: SocketAddr) -> TcpStream {
    let mut stream = connect_no_auth(proxy).await;
    stream
        .write_all(&socks5_mock::create_connect(target))
        .await
        .unwrap();

    let (rep, bind) = read_reply(&mut stream).await;
    assert_eq!(rep, 0x00);
    assert!(bind.ip.is_some());
    stream
}

/// Whether the proxy closed the connection without sending anything
pub async fn closed_without_reply(stream: &mut TcpStream) -> bool {
    let mut buf = [0u8; 16];
    matches!(stream.read(&mut buf).await, Ok(0) | Err(_))
}

/// Mock SOCKS5 handshake data
pub mod socks5_mock {
    use crabproxy::socks::*;
    use std::net::SocketAddr;

    /// Create a no-auth method selection request
    pub fn create_auth_request_no_auth() -> Vec<u8> {
        vec![SOCKS5_VERSION, 1, SOCKS5_AUTH_METHOD_NONE]
    }

    /// Create a method selection request offering the given methods
    pub fn create_auth_request(methods: &[u8]) -> Vec<u8> {
        let mut request = vec![SOCKS5_VERSION, methods.len() as u8];
        request.extend_from_slice(methods);
        request
    }

    /// Create a username/password sub-negotiation request
    pub fn create_user_pass(username: &str, password: &str) -> Vec<u8> {
        let mut request = vec![SOCKS5_AUTH_VERSION, username.len() as u8];
        request.extend_from_slice(username.as_bytes());
        request.push(password.len() as u8);
        request.extend_from_slice(password.as_bytes());
        request
    }

    /// Create a request for `command` to a socket address
    pub fn create_request(command: u8, addr: SocketAddr) -> Vec<u8> {
        let mut cmd = vec![SOCKS5_VERSION, command, SOCKS5_RESERVED];
        cmd.extend_from_slice(&AddrSpec::from(addr).to_bytes().unwrap());
        cmd
    }

    /// Create a connect command to a socket address
    pub fn create_connect(addr: SocketAddr) -> Vec<u8> {
        create_request(SOCKS5_CMD_TCP_CONNECT, addr)
    }

    /// Create a connect command to domain
    pub fn create_connect_domain(domain: &str, port: u16) -> Vec<u8> {
        let mut cmd = vec![
            SOCKS5_VERSION,
            SOCKS5_CMD_TCP_CONNECT,
            SOCKS5_RESERVED,
            SOCKS5_ADDR_TYPE_DOMAIN,
            domain.len() as u8,
        ];
        cmd.extend_from_slice(domain.as_bytes());
        cmd.extend_from_slice(&port.to_be_bytes());
        cmd
    }
}

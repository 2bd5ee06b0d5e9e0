//! SOCKS5 protocol engine for Crabproxy
//!
//! This module implements the server side of SOCKS5 (RFC 1928) with
//! username/password authentication (RFC 1929). It works on any
//! `AsyncRead + AsyncWrite` stream; listening and admission are handled
//! by [`crate::server`].

mod auth;
mod command;
mod consts;
mod handler;
mod resolver;
mod rewriter;
mod rules;
mod tcp_relay;
mod types;

pub use auth::{
    authenticate, AuthRegistry, Authenticator, ClientStream, CredentialStore, CustomAuthenticator,
    NoAuth, PasswordAuth, StaticCredentials,
};
pub use command::{encode_reply, read_addr_spec, read_request_header, send_reply};
pub use consts::*;
pub use handler::{ConnectionHandler, Settings};
pub use resolver::{DnsResolver, NameResolver};
pub use rewriter::{AddressRewriter, FixedRewriter};
pub use rules::{PermitAll, PermitCommand, PermitDestAddrPattern, PermitNone, RuleChain, RuleSet};
pub use tcp_relay::{handle_connect, relay};
pub use types::{AddrSpec, AuthContext, Command, Request};

//! SOCKS5 authentication module
//!
//! Handles method negotiation and dispatches to the selected authenticator.

mod none;
mod password;

pub use none::NoAuth;
pub use password::{CredentialStore, PasswordAuth, StaticCredentials};

use super::consts::*;
use super::types::AuthContext;
use crate::error::Socks5Error;
use async_trait::async_trait;
use std::fmt::{self, Debug};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Object-safe client stream, used by custom authenticators
pub trait ClientStream: AsyncRead + AsyncWrite + Unpin + Send {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> ClientStream for T {}

/// A user-supplied authentication method.
///
/// The implementation owns the whole exchange after the method has been
/// selected, including announcing its own code to the client.
#[async_trait]
pub trait CustomAuthenticator: Send + Sync + Debug {
    /// Method code this authenticator answers to
    fn code(&self) -> u8;

    /// Run the method-specific exchange on the client stream
    async fn authenticate(&self, stream: &mut dyn ClientStream) -> Result<AuthContext, Socks5Error>;
}

/// An authentication method the server can negotiate
#[derive(Clone)]
pub enum Authenticator {
    /// "No authentication required" (0x00)
    NoAuth,
    /// Username/password (0x02) checked against a credential store
    UserPass(Arc<dyn CredentialStore>),
    /// Any other method
    Custom(Arc<dyn CustomAuthenticator>),
}

impl Authenticator {
    /// Method code of this authenticator
    pub fn code(&self) -> u8 {
        match self {
            Authenticator::NoAuth => SOCKS5_AUTH_METHOD_NONE,
            Authenticator::UserPass(_) => SOCKS5_AUTH_METHOD_PASSWORD,
            Authenticator::Custom(custom) => custom.code(),
        }
    }

    /// Run this method's exchange
    pub async fn authenticate<S>(&self, stream: &mut S) -> Result<AuthContext, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        match self {
            Authenticator::NoAuth => NoAuth::authenticate(stream).await,
            Authenticator::UserPass(store) => PasswordAuth::authenticate(stream, store.as_ref()).await,
            Authenticator::Custom(custom) => custom.authenticate(stream).await,
        }
    }
}

impl Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Authenticator::NoAuth => write!(f, "NoAuth"),
            Authenticator::UserPass(_) => write!(f, "UserPass"),
            Authenticator::Custom(custom) => write!(f, "Custom({:#04x})", custom.code()),
        }
    }
}

/// Lookup table from method code to authenticator.
///
/// Built once at server construction and never mutated afterwards.
pub struct AuthRegistry {
    slots: Box<[Option<Authenticator>; 256]>,
}

impl AuthRegistry {
    /// Build a registry. A later entry with the same code replaces an earlier one.
    pub fn new(methods: impl IntoIterator<Item = Authenticator>) -> Self {
        let mut slots: Box<[Option<Authenticator>; 256]> = Box::new(std::array::from_fn(|_| None));
        for method in methods {
            let code = method.code() as usize;
            slots[code] = Some(method);
        }
        AuthRegistry { slots }
    }

    /// Authenticator registered for `code`
    pub fn get(&self, code: u8) -> Option<&Authenticator> {
        self.slots[code as usize].as_ref()
    }

    /// Registered method codes, ascending
    pub fn codes(&self) -> Vec<u8> {
        (0..=u8::MAX).filter(|code| self.get(*code).is_some()).collect()
    }

    /// Pick the first offered code that is registered.
    ///
    /// The client's order is authoritative.
    pub fn select(&self, offered: &[u8]) -> Option<&Authenticator> {
        offered.iter().find_map(|code| self.get(*code))
    }
}

impl Debug for AuthRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRegistry")
            .field("codes", &self.codes())
            .finish()
    }
}

/// Perform method negotiation and authentication
///
/// The greeting's version byte has already been consumed by the caller.
/// This reads `NMETHODS | METHODS`, selects a method and runs its exchange.
///
/// When nothing matches, `{0x05, 0xFF}` is written and
/// [`Socks5Error::NoAcceptableMethod`] is returned.
pub async fn authenticate<S>(stream: &mut S, registry: &AuthRegistry) -> Result<AuthContext, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let num_methods = stream.read_u8().await?;
    let mut methods = vec![0u8; num_methods as usize];
    stream.read_exact(&mut methods).await?;

    tracing::debug!("Client offered auth methods: {:?}", methods);

    match registry.select(&methods) {
        Some(method) => method.authenticate(stream).await,
        None => {
            let reply = [SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE];
            if let Err(e) = stream.write_all(&reply).await {
                tracing::debug!("Failed to send no-acceptable-method reply: {}", e);
            } else {
                let _ = stream.flush().await;
            }
            Err(Socks5Error::NoAcceptableMethod)
        }
    }
}

//! Username/password authentication handler
//!
//! Implements RFC 1929 username/password authentication for SOCKS5.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::AuthContext;
use std::collections::HashMap;
use std::fmt::Debug;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Source of truth for username/password pairs.
///
/// Queried at most once per connection.
pub trait CredentialStore: Send + Sync + Debug {
    /// Whether the pair is valid
    fn valid(&self, username: &str, password: &str) -> bool;
}

/// Credential store backed by a static username -> password map
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    users: HashMap<String, String>,
}

impl StaticCredentials {
    /// Create an empty credential store
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a user, replacing any previous password
    pub fn with_user(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.users.insert(username.into(), password.into());
        self
    }
}

impl<U: Into<String>, P: Into<String>> FromIterator<(U, P)> for StaticCredentials {
    fn from_iter<T: IntoIterator<Item = (U, P)>>(iter: T) -> Self {
        StaticCredentials {
            users: iter
                .into_iter()
                .map(|(u, p)| (u.into(), p.into()))
                .collect(),
        }
    }
}

impl CredentialStore for StaticCredentials {
    fn valid(&self, username: &str, password: &str) -> bool {
        self.users
            .get(username)
            .is_some_and(|expected| expected == password)
    }
}

/// Username/password authentication handler
pub struct PasswordAuth;

impl PasswordAuth {
    /// Perform username/password authentication
    ///
    /// # Protocol
    ///
    /// Client sends:
    /// ```text
    /// +----+------+----------+------+----------+
    /// |VER | ULEN |  UNAME   | PLEN |  PASSWD  |
    /// +----+------+----------+------+----------+
    /// | 1  |  1   | 1 to 255 |  1   | 1 to 255 |
    /// +----+------+----------+------+----------+
    /// ```
    ///
    /// Server responds:
    /// ```text
    /// +----+--------+
    /// |VER | STATUS |
    /// +----+--------+
    /// | 1  |   1    |
    /// +----+--------+
    /// ```
    ///
    /// A wrong sub-negotiation version aborts without a status reply.
    pub async fn authenticate<S>(
        stream: &mut S,
        credentials: &dyn CredentialStore,
    ) -> Result<AuthContext, Socks5Error>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_PASSWORD])
            .await?;
        stream.flush().await?;

        // Read version and username length
        let mut header = [0u8; 2];
        stream.read_exact(&mut header).await?;

        if header[0] != SOCKS5_AUTH_VERSION {
            return Err(Socks5Error::UnsupportedAuthVersion(header[0]));
        }

        let mut username = vec![0u8; header[1] as usize];
        stream.read_exact(&mut username).await?;

        let password_len = stream.read_u8().await? as usize;
        let mut password = vec![0u8; password_len];
        stream.read_exact(&mut password).await?;

        let (username, password) = match (String::from_utf8(username), String::from_utf8(password)) {
            (Ok(username), Ok(password)) => (username, password),
            _ => {
                send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
                tracing::debug!("Authentication failed: credentials are not valid UTF-8");
                return Err(Socks5Error::AuthFailed);
            }
        };

        if credentials.valid(&username, &password) {
            send_auth_result(stream, SOCKS5_AUTH_SUCCESS).await?;
            tracing::debug!("Authentication successful for user: {}", username);
            Ok(AuthContext {
                method: SOCKS5_AUTH_METHOD_PASSWORD,
                username: Some(username),
            })
        } else {
            send_auth_result(stream, SOCKS5_AUTH_FAILURE).await?;
            tracing::debug!("Authentication failed for user: {}", username);
            Err(Socks5Error::AuthFailed)
        }
    }
}

/// Send authentication result to client
async fn send_auth_result<S: AsyncWrite + Unpin>(stream: &mut S, status: u8) -> Result<(), Socks5Error> {
    stream.write_all(&[SOCKS5_AUTH_VERSION, status]).await?;
    stream.flush().await?;
    Ok(())
}

//! No authentication handler
//!
//! Handles the case when no authentication is required.

use crate::error::Socks5Error;
use crate::socks::consts::{SOCKS5_AUTH_METHOD_NONE, SOCKS5_VERSION};
use crate::socks::types::AuthContext;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// No authentication handler
pub struct NoAuth;

impl NoAuth {
    /// Announce the "no authentication" method. Always succeeds.
    pub async fn authenticate<S>(stream: &mut S) -> Result<AuthContext, Socks5Error>
    where
        S: AsyncWrite + Unpin,
    {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
            .await?;
        stream.flush().await?;
        Ok(AuthContext::anonymous())
    }
}

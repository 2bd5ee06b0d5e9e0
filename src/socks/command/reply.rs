//! SOCKS5 reply builder
//!
//! Constructs SOCKS5 reply messages.

use crate::error::{ReplyCode, Socks5Error};
use crate::socks::consts::*;
use crate::socks::types::AddrSpec;
use bytes::{BufMut, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encode a SOCKS5 reply frame
///
/// # SOCKS5 Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Without a bind address the zero IPv4 address `0.0.0.0:0` is encoded,
/// so the frame is never shorter than ten bytes.
pub fn encode_reply(reply: ReplyCode, bind_addr: Option<&AddrSpec>) -> Result<BytesMut, Socks5Error> {
    let mut buf = BytesMut::with_capacity(4 + 1 + MAX_DOMAIN_LEN + 2);
    buf.put_u8(SOCKS5_VERSION);
    buf.put_u8(reply.into());
    buf.put_u8(SOCKS5_RESERVED);

    match bind_addr {
        Some(addr) => addr.encode(&mut buf)?,
        None => AddrSpec::unspecified().encode(&mut buf)?,
    }

    Ok(buf)
}

/// Build and send a SOCKS5 reply
pub async fn send_reply<S>(
    stream: &mut S,
    reply: ReplyCode,
    bind_addr: Option<&AddrSpec>,
) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    let frame = encode_reply(reply, bind_addr)?;
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}

/// Send a "command not supported" reply
pub async fn send_command_not_supported<S>(stream: &mut S) -> Result<(), Socks5Error>
where
    S: AsyncWrite + Unpin,
{
    send_reply(stream, ReplyCode::CommandNotSupported, None).await
}

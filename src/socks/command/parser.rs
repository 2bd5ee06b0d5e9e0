//! SOCKS5 request parser
//!
//! Parses the request header and destination address sent by the client.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::AddrSpec;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read the request header and return the raw command byte
///
/// # SOCKS5 Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Only `VER`, `CMD` and `RSV` are consumed here; the address follows via
/// [`read_addr_spec`]. The command byte is returned unparsed so that the
/// caller can reply to unknown commands after the address is drained.
pub async fn read_request_header<S>(stream: &mut S) -> Result<u8, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 3];
    stream.read_exact(&mut header).await?;

    if header[0] != SOCKS5_VERSION {
        return Err(Socks5Error::UnsupportedVersion(header[0]));
    }

    Ok(header[1])
}

/// Read `ATYP | ADDR | PORT` from the stream
///
/// Returns [`Socks5Error::AddressTypeNotSupported`] for an unknown type byte;
/// nothing after the type byte is consumed in that case.
pub async fn read_addr_spec<S>(stream: &mut S) -> Result<AddrSpec, Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let addr_type = stream.read_u8().await?;

    let mut addr = match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut octets = [0u8; 4];
            stream.read_exact(&mut octets).await?;
            AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::from(octets)), 0)
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            let mut octets = [0u8; 16];
            stream.read_exact(&mut octets).await?;
            AddrSpec::from_ip(IpAddr::V6(Ipv6Addr::from(octets)), 0)
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let len = stream.read_u8().await? as usize;
            let mut name = vec![0u8; len];
            stream.read_exact(&mut name).await?;
            let name = String::from_utf8(name).map_err(|e| {
                Socks5Error::InvalidDomain(String::from_utf8_lossy(e.as_bytes()).into_owned())
            })?;
            AddrSpec::from_domain(name, 0)
        }

        other => return Err(Socks5Error::AddressTypeNotSupported(other)),
    };

    addr.port = stream.read_u16().await?;

    Ok(addr)
}

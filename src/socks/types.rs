//! SOCKS5 type definitions
//!
//! Defines the core types used in SOCKS5 protocol handling.

use super::consts::*;
use crate::error::Socks5Error;
use bytes::{BufMut, BytesMut};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// SOCKS5 command types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// TCP CONNECT - establish a TCP connection to target
    Connect,
    /// TCP BIND - wait for incoming connection (not implemented)
    Bind,
    /// UDP ASSOCIATE - establish UDP relay (not implemented)
    Associate,
}

impl Command {
    /// Parse a command byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            SOCKS5_CMD_TCP_CONNECT => Some(Command::Connect),
            SOCKS5_CMD_TCP_BIND => Some(Command::Bind),
            SOCKS5_CMD_UDP_ASSOCIATE => Some(Command::Associate),
            _ => None,
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Connect => write!(f, "CONNECT"),
            Command::Bind => write!(f, "BIND"),
            Command::Associate => write!(f, "ASSOCIATE"),
        }
    }
}

/// Destination or bind address of a request or reply.
///
/// On the wire exactly one of `fqdn` and `ip` is present. After name
/// resolution both may be set: the name is kept for diagnostics and the
/// address is used for transport.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AddrSpec {
    /// Domain name, if the client sent one
    pub fqdn: Option<String>,
    /// Raw or resolved IP address
    pub ip: Option<IpAddr>,
    /// Port number
    pub port: u16,
}

impl AddrSpec {
    /// Create an address from an IP and port
    pub fn from_ip(ip: IpAddr, port: u16) -> Self {
        AddrSpec {
            fqdn: None,
            ip: Some(ip),
            port,
        }
    }

    /// Create an address from a domain name and port
    pub fn from_domain(fqdn: impl Into<String>, port: u16) -> Self {
        AddrSpec {
            fqdn: Some(fqdn.into()),
            ip: None,
            port,
        }
    }

    /// The all-zero IPv4 address used when a reply carries no meaningful address
    pub fn unspecified() -> Self {
        AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 0)
    }

    /// Socket address for dialing, available once an IP is known
    pub fn socket_addr(&self) -> Option<SocketAddr> {
        self.ip.map(|ip| SocketAddr::new(ip, self.port))
    }

    /// Address type byte this address encodes as
    pub fn addr_type(&self) -> u8 {
        match (&self.fqdn, self.ip) {
            (Some(_), _) => SOCKS5_ADDR_TYPE_DOMAIN,
            (None, Some(ip)) if as_ipv4(ip).is_some() => SOCKS5_ADDR_TYPE_IPV4,
            (None, Some(_)) => SOCKS5_ADDR_TYPE_IPV6,
            (None, None) => SOCKS5_ADDR_TYPE_IPV4,
        }
    }

    /// Encode `ATYP | ADDR | PORT` into `buf`.
    ///
    /// A domain name takes precedence over an IP. An IP that maps cleanly
    /// onto four bytes is written as IPv4. With neither field populated the
    /// zero IPv4 address is written.
    pub fn encode(&self, buf: &mut BytesMut) -> Result<(), Socks5Error> {
        match (&self.fqdn, self.ip) {
            (Some(fqdn), _) => {
                if fqdn.len() > MAX_DOMAIN_LEN {
                    return Err(Socks5Error::InvalidDomain(fqdn.clone()));
                }
                buf.put_u8(SOCKS5_ADDR_TYPE_DOMAIN);
                buf.put_u8(fqdn.len() as u8);
                buf.put_slice(fqdn.as_bytes());
            }
            (None, Some(ip)) => match (as_ipv4(ip), ip) {
                (Some(v4), _) => {
                    buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
                    buf.put_slice(&v4.octets());
                }
                (None, IpAddr::V6(v6)) => {
                    buf.put_u8(SOCKS5_ADDR_TYPE_IPV6);
                    buf.put_slice(&v6.octets());
                }
                (None, IpAddr::V4(v4)) => {
                    buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
                    buf.put_slice(&v4.octets());
                }
            },
            (None, None) => {
                buf.put_u8(SOCKS5_ADDR_TYPE_IPV4);
                buf.put_slice(&Ipv4Addr::UNSPECIFIED.octets());
            }
        }
        buf.put_u16(self.port);
        Ok(())
    }

    /// Encode the address into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, Socks5Error> {
        let mut buf = BytesMut::with_capacity(1 + 1 + MAX_DOMAIN_LEN + 2);
        self.encode(&mut buf)?;
        Ok(buf.to_vec())
    }
}

/// IPv4 view of an address, including IPv4-mapped IPv6 addresses
fn as_ipv4(ip: IpAddr) -> Option<Ipv4Addr> {
    match ip {
        IpAddr::V4(v4) => Some(v4),
        IpAddr::V6(v6) => v6.to_ipv4_mapped(),
    }
}

impl From<SocketAddr> for AddrSpec {
    fn from(addr: SocketAddr) -> Self {
        AddrSpec::from_ip(addr.ip(), addr.port())
    }
}

impl fmt::Display for AddrSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.fqdn, self.ip) {
            (Some(fqdn), Some(ip)) => write!(f, "{} ({}):{}", fqdn, ip, self.port),
            (Some(fqdn), None) => write!(f, "{}:{}", fqdn, self.port),
            (None, Some(ip)) => write!(f, "{}", SocketAddr::new(ip, self.port)),
            (None, None) => write!(f, "<unspecified>:{}", self.port),
        }
    }
}

/// Outcome of a successful authentication exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthContext {
    /// Method code that was negotiated
    pub method: u8,
    /// Authenticated username, for username/password sessions
    pub username: Option<String>,
}

impl AuthContext {
    /// Context for a session that negotiated "no authentication"
    pub fn anonymous() -> Self {
        AuthContext {
            method: SOCKS5_AUTH_METHOD_NONE,
            username: None,
        }
    }
}

/// A parsed request, as seen by rules and rewriters
#[derive(Debug, Clone)]
pub struct Request {
    /// Requested command
    pub command: Command,
    /// Effective destination, after resolution and rewriting
    pub dest_addr: AddrSpec,
    /// Destination exactly as the client asked for it
    pub requested_addr: AddrSpec,
    /// Client source address
    pub remote_addr: SocketAddr,
    /// Authentication outcome for this session
    pub auth: AuthContext,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv6Addr;

    #[test]
    fn test_command_from_byte() {
        assert_eq!(Command::from_byte(1), Some(Command::Connect));
        assert_eq!(Command::from_byte(2), Some(Command::Bind));
        assert_eq!(Command::from_byte(3), Some(Command::Associate));
        assert_eq!(Command::from_byte(0), None);
        assert_eq!(Command::from_byte(0x99), None);
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::Connect.to_string(), "CONNECT");
        assert_eq!(Command::Associate.to_string(), "ASSOCIATE");
    }

    #[test]
    fn test_addr_spec_encode_ipv4() {
        let addr = AddrSpec::from_ip(IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)), 8080);
        let bytes = addr.to_bytes().unwrap();
        assert_eq!(bytes, vec![SOCKS5_ADDR_TYPE_IPV4, 192, 168, 1, 1, 0x1F, 0x90]);
    }

    #[test]
    fn test_addr_spec_encode_ipv6() {
        let addr = AddrSpec::from_ip(IpAddr::V6(Ipv6Addr::LOCALHOST), 443);
        let bytes = addr.to_bytes().unwrap();
        assert_eq!(bytes[0], SOCKS5_ADDR_TYPE_IPV6);
        assert_eq!(bytes.len(), 1 + 16 + 2);
        assert_eq!(&bytes[17..], &443u16.to_be_bytes());
    }

    #[test]
    fn test_addr_spec_encode_mapped_ipv6_as_ipv4() {
        let mapped = Ipv4Addr::new(10, 1, 2, 3).to_ipv6_mapped();
        let addr = AddrSpec::from_ip(IpAddr::V6(mapped), 80);
        assert_eq!(addr.addr_type(), SOCKS5_ADDR_TYPE_IPV4);
        assert_eq!(addr.to_bytes().unwrap(), vec![1, 10, 1, 2, 3, 0, 80]);
    }

    #[test]
    fn test_addr_spec_encode_domain_wins_over_ip() {
        let mut addr = AddrSpec::from_domain("example.com", 443);
        addr.ip = Some(IpAddr::V4(Ipv4Addr::new(93, 184, 216, 34)));
        let bytes = addr.to_bytes().unwrap();
        assert_eq!(bytes[0], SOCKS5_ADDR_TYPE_DOMAIN);
        assert_eq!(bytes[1], 11);
        assert_eq!(&bytes[2..13], b"example.com");
        assert_eq!(&bytes[13..], &443u16.to_be_bytes());
    }

    #[test]
    fn test_addr_spec_encode_empty_is_zero_ipv4() {
        let bytes = AddrSpec::default().to_bytes().unwrap();
        assert_eq!(bytes, vec![SOCKS5_ADDR_TYPE_IPV4, 0, 0, 0, 0, 0, 0]);
        assert_eq!(AddrSpec::unspecified().to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_addr_spec_encode_domain_too_long() {
        let addr = AddrSpec::from_domain("a".repeat(256), 80);
        assert!(matches!(addr.to_bytes(), Err(Socks5Error::InvalidDomain(_))));
    }

    #[test]
    fn test_addr_spec_display() {
        let mut addr = AddrSpec::from_domain("example.com", 80);
        assert_eq!(addr.to_string(), "example.com:80");
        addr.ip = Some(IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(addr.to_string(), "example.com (127.0.0.1):80");

        let addr = AddrSpec::from_ip(IpAddr::V6(Ipv6Addr::LOCALHOST), 22);
        assert_eq!(addr.to_string(), "[::1]:22");
    }

    #[test]
    fn test_addr_spec_socket_addr() {
        assert!(AddrSpec::from_domain("example.com", 80).socket_addr().is_none());
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        assert_eq!(AddrSpec::from(addr).socket_addr(), Some(addr));
    }
}

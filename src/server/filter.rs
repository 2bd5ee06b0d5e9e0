//! Accept-time admission filter
//!
//! Checks the peer address of an accepted connection against allowed IPs
//! and allowed networks before any protocol byte is read.

use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// An IP network in CIDR notation, e.g. `10.0.0.0/8` or `fd00::/8`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Create a network, rejecting prefixes longer than the address
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, CidrParseError> {
        let max = max_prefix(&addr);
        if prefix > max {
            return Err(CidrParseError(format!(
                "prefix /{} is longer than /{}",
                prefix, max
            )));
        }
        Ok(Cidr { addr, prefix })
    }

    /// Network address as given
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Whether `ip` lies inside this network.
    ///
    /// Addresses of the other family never match.
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(net), IpAddr::V4(ip)) => {
                let mask = mask_u32(self.prefix);
                u32::from(net) & mask == u32::from(ip) & mask
            }
            (IpAddr::V6(net), IpAddr::V6(ip)) => {
                let mask = mask_u128(self.prefix);
                u128::from(net) & mask == u128::from(ip) & mask
            }
            _ => false,
        }
    }
}

fn max_prefix(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask_u32(prefix: u8) -> u32 {
    match prefix {
        0 => 0,
        p => u32::MAX << (32 - u32::from(p)),
    }
}

fn mask_u128(prefix: u8) -> u128 {
    match prefix {
        0 => 0,
        p => u128::MAX << (128 - u32::from(p)),
    }
}

/// Error returned when a CIDR string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid CIDR: {0}")]
pub struct CidrParseError(String);

impl FromStr for Cidr {
    type Err = CidrParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (addr, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| CidrParseError(format!("missing prefix length in '{}'", s)))?;

        let addr: IpAddr = addr
            .parse()
            .map_err(|_| CidrParseError(format!("bad address in '{}'", s)))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| CidrParseError(format!("bad prefix length in '{}'", s)))?;

        Cidr::new(addr, prefix)
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Union of allowed peer IPs and allowed peer networks.
///
/// An empty filter admits everyone.
#[derive(Debug, Clone, Default)]
pub struct AdmissionFilter {
    ips: Vec<IpAddr>,
    nets: Vec<Cidr>,
}

impl AdmissionFilter {
    /// Create an empty filter
    pub fn new() -> Self {
        Self::default()
    }

    /// Admit a single address
    pub fn allow_ip(&mut self, ip: IpAddr) {
        self.ips.push(ip.to_canonical());
    }

    /// Admit a whole network
    pub fn allow_net(&mut self, net: Cidr) {
        self.nets.push(net);
    }

    /// Whether no restriction is configured
    pub fn is_empty(&self) -> bool {
        self.ips.is_empty() && self.nets.is_empty()
    }

    /// Whether a peer at `ip` may connect
    pub fn admits(&self, ip: IpAddr) -> bool {
        if self.is_empty() {
            return true;
        }

        let ip = ip.to_canonical();
        self.ips.contains(&ip) || self.nets.iter().any(|net| net.contains(ip))
    }
}

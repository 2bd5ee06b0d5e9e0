//! Error types for Crabproxy
//!
//! This module defines the error types used by the protocol core and by the
//! server/configuration layers.

use crate::socks::Command;
use std::io;
use thiserror::Error;

/// Main error type for Crabproxy operations
#[derive(Error, Debug)]
pub enum CrabProxyError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// SOCKS5 protocol error
    #[error("SOCKS5 error: {0}")]
    Socks5(#[from] Socks5Error),
}

/// Errors raised while serving a single SOCKS5 session.
///
/// Every variant is fatal to the session that produced it and to nothing
/// else. Where the protocol calls for a reply frame, it has already been
/// written by the time the error is returned.
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Version byte of the greeting or request is not 0x05
    #[error("Unsupported SOCKS version: {0}")]
    UnsupportedVersion(u8),

    /// Username/password sub-negotiation version is not 0x01
    #[error("Unsupported auth version: {0}")]
    UnsupportedAuthVersion(u8),

    /// None of the offered methods is registered
    #[error("No supported authentication mechanism")]
    NoAcceptableMethod,

    /// Credentials were rejected by the credential store
    #[error("User authentication failed")]
    AuthFailed,

    /// Address type byte is not IPv4, IPv6 or domain
    #[error("Unrecognized address type: {0}")]
    AddressTypeNotSupported(u8),

    /// Domain name bytes are not valid UTF-8
    #[error("Invalid domain name: {0}")]
    InvalidDomain(String),

    /// Command byte is not CONNECT, BIND or ASSOCIATE
    #[error("Unsupported command: {0}")]
    CommandNotSupported(u8),

    /// Name resolution of the requested domain failed
    #[error("Failed to resolve destination '{name}': {source}")]
    ResolveFailed {
        /// Requested domain name
        name: String,
        /// Underlying resolver error
        #[source]
        source: io::Error,
    },

    /// The rule set denied the request
    #[error("{command} to {dest} blocked by rules")]
    BlockedByRules {
        /// Requested command
        command: Command,
        /// Requested destination, formatted for diagnostics
        dest: String,
    },

    /// Dialing the destination failed
    #[error("Connect to {dest} failed ({reply:?}): {source}")]
    ConnectFailed {
        /// Destination, formatted for diagnostics
        dest: String,
        /// Reply code sent to the client
        reply: ReplyCode,
        /// Underlying dial error
        #[source]
        source: io::Error,
    },

    /// IO error on the client or target stream
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Reply codes for SOCKS5 protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ReplyCode {
    /// Command succeeded
    Succeeded = 0x00,
    /// General SOCKS server failure
    ServerFailure = 0x01,
    /// Connection not allowed by ruleset
    RuleFailure = 0x02,
    /// Network unreachable
    NetworkUnreachable = 0x03,
    /// Host unreachable
    HostUnreachable = 0x04,
    /// Connection refused
    ConnectionRefused = 0x05,
    /// TTL expired
    TtlExpired = 0x06,
    /// Command not supported
    CommandNotSupported = 0x07,
    /// Address type not supported
    AddrTypeNotSupported = 0x08,
}

impl From<ReplyCode> for u8 {
    fn from(code: ReplyCode) -> Self {
        code as u8
    }
}

impl TryFrom<u8> for ReplyCode {
    type Error = Socks5Error;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(ReplyCode::Succeeded),
            0x01 => Ok(ReplyCode::ServerFailure),
            0x02 => Ok(ReplyCode::RuleFailure),
            0x03 => Ok(ReplyCode::NetworkUnreachable),
            0x04 => Ok(ReplyCode::HostUnreachable),
            0x05 => Ok(ReplyCode::ConnectionRefused),
            0x06 => Ok(ReplyCode::TtlExpired),
            0x07 => Ok(ReplyCode::CommandNotSupported),
            0x08 => Ok(ReplyCode::AddrTypeNotSupported),
            other => Err(Socks5Error::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown reply code: {}", other),
            ))),
        }
    }
}

impl From<&io::Error> for ReplyCode {
    /// Classify a dial failure into one of three reply buckets.
    ///
    /// The error kind is consulted first. Errors that carry no specific kind
    /// fall back to inspecting the message text, which is best effort and
    /// may misclassify platform-specific wording.
    fn from(err: &io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionRefused => ReplyCode::ConnectionRefused,
            io::ErrorKind::NetworkUnreachable => ReplyCode::NetworkUnreachable,
            io::ErrorKind::HostUnreachable | io::ErrorKind::TimedOut => ReplyCode::HostUnreachable,
            _ => {
                let msg = err.to_string().to_lowercase();
                if msg.contains("refused") {
                    ReplyCode::ConnectionRefused
                } else if msg.contains("network is unreachable") {
                    ReplyCode::NetworkUnreachable
                } else {
                    ReplyCode::HostUnreachable
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reply_code_wire_order() {
        let ordered = [
            ReplyCode::Succeeded,
            ReplyCode::ServerFailure,
            ReplyCode::RuleFailure,
            ReplyCode::NetworkUnreachable,
            ReplyCode::HostUnreachable,
            ReplyCode::ConnectionRefused,
            ReplyCode::TtlExpired,
            ReplyCode::CommandNotSupported,
            ReplyCode::AddrTypeNotSupported,
        ];

        for (byte, code) in ordered.iter().enumerate() {
            assert_eq!(u8::from(*code), byte as u8);
            assert_eq!(ReplyCode::try_from(byte as u8).unwrap(), *code);
        }
    }

    #[test]
    fn test_reply_code_from_u8_invalid() {
        assert!(ReplyCode::try_from(0x09).is_err());
        assert!(ReplyCode::try_from(0xFF).is_err());
    }

    #[test]
    fn test_reply_code_from_io_error_kind() {
        let err = io::Error::from(io::ErrorKind::ConnectionRefused);
        assert_eq!(ReplyCode::from(&err), ReplyCode::ConnectionRefused);

        let err = io::Error::from(io::ErrorKind::NetworkUnreachable);
        assert_eq!(ReplyCode::from(&err), ReplyCode::NetworkUnreachable);

        let err = io::Error::from(io::ErrorKind::HostUnreachable);
        assert_eq!(ReplyCode::from(&err), ReplyCode::HostUnreachable);

        let err = io::Error::from(io::ErrorKind::TimedOut);
        assert_eq!(ReplyCode::from(&err), ReplyCode::HostUnreachable);

        let err = io::Error::from(io::ErrorKind::PermissionDenied);
        assert_eq!(ReplyCode::from(&err), ReplyCode::HostUnreachable);
    }

    #[test]
    fn test_reply_code_from_io_error_message() {
        let err = io::Error::new(io::ErrorKind::Other, "dial tcp: connection refused");
        assert_eq!(ReplyCode::from(&err), ReplyCode::ConnectionRefused);

        let err = io::Error::new(io::ErrorKind::Other, "connect: Network is unreachable");
        assert_eq!(ReplyCode::from(&err), ReplyCode::NetworkUnreachable);

        let err = io::Error::new(io::ErrorKind::Other, "something else");
        assert_eq!(ReplyCode::from(&err), ReplyCode::HostUnreachable);
    }

    #[test]
    fn test_socks5_error_display() {
        let err = Socks5Error::UnsupportedVersion(4);
        assert_eq!(format!("{}", err), "Unsupported SOCKS version: 4");

        let err = Socks5Error::NoAcceptableMethod;
        assert_eq!(format!("{}", err), "No supported authentication mechanism");

        let err = Socks5Error::AuthFailed;
        assert_eq!(format!("{}", err), "User authentication failed");

        let err = Socks5Error::AddressTypeNotSupported(0x99);
        assert_eq!(format!("{}", err), "Unrecognized address type: 153");

        let err = Socks5Error::BlockedByRules {
            command: Command::Connect,
            dest: "10.0.0.1:80".to_string(),
        };
        assert_eq!(format!("{}", err), "CONNECT to 10.0.0.1:80 blocked by rules");
    }

    #[test]
    fn test_crabproxy_error_display() {
        let err = CrabProxyError::Config("invalid config".to_string());
        assert_eq!(format!("{}", err), "Configuration error: invalid config");
    }

    #[test]
    fn test_crabproxy_error_from_socks5() {
        let err: CrabProxyError = Socks5Error::AuthFailed.into();
        assert!(matches!(err, CrabProxyError::Socks5(Socks5Error::AuthFailed)));
    }

    #[test]
    fn test_crabproxy_error_from_io() {
        let io_err = io::Error::new(io::ErrorKind::Other, "io error");
        let err: CrabProxyError = io_err.into();
        assert!(matches!(err, CrabProxyError::Io(_)));
    }
}

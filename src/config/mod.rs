//! Configuration module for Crabproxy
//!
//! This module provides configuration types and parsing for the server.

mod server;
mod transport;

pub use server::{AuthConfig, CommandName, Config, FilterConfig, RulesConfig};
pub use transport::TcpConfig;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

    parse_config(&content)
}

/// Parse configuration from a TOML string
pub fn parse_config(content: &str) -> Result<Config> {
    toml::from_str(content).with_context(|| "Failed to parse configuration")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_empty_config() {
        let config = parse_config("").unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_parse_full_config() {
        let config_str = r#"
listen = "127.0.0.1:1081"

[auth]
username = "user"
password = "pass"

[rules]
allowed_dest_fqdn = "^(.+\\.)?example\\.com$"
allowed_commands = ["connect"]

[filter]
allowed_ips = ["192.0.2.1"]
allowed_nets = ["10.0.0.0/8", "fd00::/8"]

[tcp]
nodelay = false
keepalive_secs = 30
keepalive_interval = 10
connect_timeout = 5
"#;

        let config = parse_config(config_str).unwrap();
        assert_eq!(config.listen, "127.0.0.1:1081".parse().unwrap());
        assert_eq!(config.auth.username.as_deref(), Some("user"));
        assert_eq!(config.rules.allowed_commands, vec![CommandName::Connect]);
        assert_eq!(config.filter.allowed_nets.len(), 2);
        assert!(!config.tcp.nodelay);
        assert_eq!(config.tcp.connect_timeout, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_invalid_config() {
        assert!(parse_config("listen = 1080").is_err());
        assert!(parse_config("[rules]\nallowed_commands = [\"ping\"]").is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "listen = \"127.0.0.1:2080\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.listen.port(), 2080);
    }

    #[test]
    fn test_load_config_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(dir.path().join("missing.toml")).is_err());
    }
}

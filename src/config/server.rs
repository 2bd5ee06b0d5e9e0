//! Server configuration types
//!
//! Defines the main configuration structures for the Crabproxy server.

use super::TcpConfig;
use crate::error::CrabProxyError;
use crate::server::{Cidr, ServerBuilder};
use crate::socks::{Command, PermitCommand, PermitDestAddrPattern, RuleChain, StaticCredentials};
use crate::transport::TcpConnector;
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

/// Default listen address
fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 1080))
}

/// Root configuration structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Address to listen on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Static credentials
    #[serde(default)]
    pub auth: AuthConfig,

    /// Per-request rules
    #[serde(default)]
    pub rules: RulesConfig,

    /// Accept-time peer filter
    #[serde(default)]
    pub filter: FilterConfig,

    /// Outbound TCP options
    #[serde(default)]
    pub tcp: TcpConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            listen: default_listen(),
            auth: AuthConfig::default(),
            rules: RulesConfig::default(),
            filter: FilterConfig::default(),
            tcp: TcpConfig::default(),
        }
    }
}

/// Username/password configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct AuthConfig {
    /// Username for SOCKS5 auth
    #[serde(default)]
    pub username: Option<String>,

    /// Password for SOCKS5 auth
    #[serde(default)]
    pub password: Option<String>,
}

impl AuthConfig {
    /// Check if authentication credentials are configured
    pub fn has_credentials(&self) -> bool {
        self.username.is_some() && self.password.is_some()
    }
}

/// Command names accepted in `rules.allowed_commands`
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CommandName {
    /// CONNECT
    Connect,
    /// BIND
    Bind,
    /// UDP ASSOCIATE
    Associate,
}

impl From<CommandName> for Command {
    fn from(name: CommandName) -> Self {
        match name {
            CommandName::Connect => Command::Connect,
            CommandName::Bind => Command::Bind,
            CommandName::Associate => Command::Associate,
        }
    }
}

fn default_allowed_commands() -> Vec<CommandName> {
    vec![CommandName::Connect, CommandName::Bind, CommandName::Associate]
}

/// Per-request rule configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RulesConfig {
    /// Regular expression the requested domain name must match
    #[serde(default)]
    pub allowed_dest_fqdn: Option<String>,

    /// Commands that pass the rule check
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<CommandName>,
}

impl Default for RulesConfig {
    fn default() -> Self {
        RulesConfig {
            allowed_dest_fqdn: None,
            allowed_commands: default_allowed_commands(),
        }
    }
}

/// Accept-time peer filter configuration
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct FilterConfig {
    /// Peer addresses allowed to connect
    #[serde(default)]
    pub allowed_ips: Vec<String>,

    /// Peer networks allowed to connect, in CIDR notation
    #[serde(default)]
    pub allowed_nets: Vec<String>,
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), CrabProxyError> {
        if self.auth.username.is_some() != self.auth.password.is_some() {
            return Err(CrabProxyError::Config(
                "username and password must be configured together".to_string(),
            ));
        }

        self.rule_chain()?;
        self.parse_ips()?;
        self.parse_nets()?;

        Ok(())
    }

    /// Convert into a [`ServerBuilder`] with every configured collaborator
    pub fn server_builder(&self) -> Result<ServerBuilder, CrabProxyError> {
        self.validate()?;

        let mut builder = ServerBuilder::new().connector(Arc::new(TcpConnector::from_config(&self.tcp)));

        if let (Some(username), Some(password)) = (&self.auth.username, &self.auth.password) {
            builder = builder.credentials(Arc::new(
                StaticCredentials::new().with_user(username.clone(), password.clone()),
            ));
        }

        let chain = self.rule_chain()?;
        if !chain.is_empty() {
            builder = builder.rules(Arc::new(chain));
        }

        for ip in self.parse_ips()? {
            builder = builder.allow_ip(ip);
        }
        for net in self.parse_nets()? {
            builder = builder.allow_net(net);
        }

        Ok(builder)
    }

    fn rule_chain(&self) -> Result<RuleChain, CrabProxyError> {
        let mut chain = RuleChain::new();

        let commands: Vec<Command> = self
            .rules
            .allowed_commands
            .iter()
            .map(|name| Command::from(*name))
            .collect();
        let permit = PermitCommand::only(&commands);
        if permit != PermitCommand::default() {
            chain = chain.with(Arc::new(permit));
        }

        if let Some(pattern) = &self.rules.allowed_dest_fqdn {
            let rule = PermitDestAddrPattern::new(pattern).map_err(|e| {
                CrabProxyError::Config(format!("invalid allowed_dest_fqdn pattern: {}", e))
            })?;
            chain = chain.with(Arc::new(rule));
        }

        Ok(chain)
    }

    fn parse_ips(&self) -> Result<Vec<IpAddr>, CrabProxyError> {
        self.filter
            .allowed_ips
            .iter()
            .map(|ip| {
                ip.trim()
                    .parse::<IpAddr>()
                    .map_err(|_| CrabProxyError::Config(format!("invalid allowed IP: {}", ip)))
            })
            .collect()
    }

    fn parse_nets(&self) -> Result<Vec<Cidr>, CrabProxyError> {
        self.filter
            .allowed_nets
            .iter()
            .map(|net| {
                net.parse::<Cidr>()
                    .map_err(|e| CrabProxyError::Config(e.to_string()))
            })
            .collect()
    }
}

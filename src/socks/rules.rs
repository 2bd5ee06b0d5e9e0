//! Admission rules evaluated per request
//!
//! A [`RuleSet`] sees the full request (command, effective and requested
//! destination, client address, auth outcome) and answers allow/deny.
//! Rules are stateless across calls.

use super::types::{Command, Request};
use regex::Regex;
use std::fmt::Debug;
use std::sync::Arc;

/// Per-request admission policy
pub trait RuleSet: Send + Sync + Debug {
    /// Whether the request may proceed
    fn allow(&self, request: &Request) -> bool;
}

/// Allows every request
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitAll;

impl RuleSet for PermitAll {
    fn allow(&self, _request: &Request) -> bool {
        true
    }
}

/// Denies every request
#[derive(Debug, Clone, Copy, Default)]
pub struct PermitNone;

impl RuleSet for PermitNone {
    fn allow(&self, _request: &Request) -> bool {
        false
    }
}

/// Allows or denies by command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermitCommand {
    /// Allow CONNECT
    pub enable_connect: bool,
    /// Allow BIND
    pub enable_bind: bool,
    /// Allow ASSOCIATE
    pub enable_associate: bool,
}

impl PermitCommand {
    /// Allow only the listed commands
    pub fn only(commands: &[Command]) -> Self {
        PermitCommand {
            enable_connect: commands.contains(&Command::Connect),
            enable_bind: commands.contains(&Command::Bind),
            enable_associate: commands.contains(&Command::Associate),
        }
    }
}

impl Default for PermitCommand {
    fn default() -> Self {
        PermitCommand {
            enable_connect: true,
            enable_bind: true,
            enable_associate: true,
        }
    }
}

impl RuleSet for PermitCommand {
    fn allow(&self, request: &Request) -> bool {
        match request.command {
            Command::Connect => self.enable_connect,
            Command::Bind => self.enable_bind,
            Command::Associate => self.enable_associate,
        }
    }
}

/// Allows requests whose domain name matches a pattern.
///
/// The pattern is matched against the name the client asked for, not the
/// resolved or rewritten address. Requests sent as IP literals carry no
/// name and are tested as the empty string.
#[derive(Debug, Clone)]
pub struct PermitDestAddrPattern {
    pattern: Regex,
}

impl PermitDestAddrPattern {
    /// Compile `pattern` into a rule
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(PermitDestAddrPattern {
            pattern: Regex::new(pattern)?,
        })
    }
}

impl RuleSet for PermitDestAddrPattern {
    fn allow(&self, request: &Request) -> bool {
        let name = request.requested_addr.fqdn.as_deref().unwrap_or("");
        self.pattern.is_match(name)
    }
}

/// Allows a request only if every inner rule allows it
#[derive(Debug, Clone, Default)]
pub struct RuleChain {
    rules: Vec<Arc<dyn RuleSet>>,
}

impl RuleChain {
    /// Create an empty chain, which allows everything
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a rule
    pub fn with(mut self, rule: Arc<dyn RuleSet>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Number of rules in the chain
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Whether the chain has no rules
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleSet for RuleChain {
    fn allow(&self, request: &Request) -> bool {
        self.rules.iter().all(|rule| rule.allow(request))
    }
}

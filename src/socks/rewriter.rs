//! Transparent destination rewriting

use super::types::{AddrSpec, Request};
use std::fmt::Debug;

/// Substitutes the destination of a request.
///
/// Applied after name resolution and before rule evaluation and dialing.
/// The returned address becomes the effective destination; the request's
/// `requested_addr` keeps what the client originally asked for.
pub trait AddressRewriter: Send + Sync + Debug {
    /// Effective destination for `request`
    fn rewrite(&self, request: &Request) -> AddrSpec;
}

/// Rewrites every destination to a fixed address
#[derive(Debug, Clone)]
pub struct FixedRewriter {
    target: AddrSpec,
}

impl FixedRewriter {
    /// Send every request to `target`
    pub fn new(target: AddrSpec) -> Self {
        FixedRewriter { target }
    }
}

impl AddressRewriter for FixedRewriter {
    fn rewrite(&self, _request: &Request) -> AddrSpec {
        self.target.clone()
    }
}

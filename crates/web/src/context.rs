//! Shared per-server configuration consumed by every request and response.
//!
//! A [`ServerContext`] is assembled once through its builder, validated at
//! build time, and then read by many request instances. Administrative
//! reconfiguration swaps a whole new snapshot through [`SharedContext`];
//! in-flight requests keep the snapshot they started with.

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use thiserror::Error;

use canon_http::forwarded::{TrustPolicy, TrustedProxyPredicate};

use crate::charset::Charset;

/// Configuration errors raised at [`ServerContextBuilder::build`] time.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown charset label: {label:?}")]
    UnknownCharset { label: String },

    #[error("trust policy `Allowlist` requires a trusted proxy predicate")]
    MissingTrustedProxyPredicate,
}

/// Immutable per-server configuration snapshot.
#[derive(Clone, Default)]
pub struct ServerContext {
    default_request_charset: Option<Charset>,
    default_response_charset: Option<Charset>,
    trust_policy: TrustPolicy,
    trusted_proxies: Option<Arc<TrustedProxyPredicate>>,
}

impl ServerContext {
    /// Starts building a context.
    pub fn builder() -> ServerContextBuilder {
        ServerContextBuilder::default()
    }

    /// The configured default charset for request bodies, if any.
    #[inline]
    pub fn default_request_charset(&self) -> Option<Charset> {
        self.default_request_charset
    }

    /// The configured default charset for response bodies, if any.
    #[inline]
    pub fn default_response_charset(&self) -> Option<Charset> {
        self.default_response_charset
    }

    /// The policy gating forwarding-header resolution.
    #[inline]
    pub fn trust_policy(&self) -> TrustPolicy {
        self.trust_policy
    }

    /// The allowlist predicate, present iff the policy is `Allowlist`.
    pub fn trusted_proxies(&self) -> Option<&TrustedProxyPredicate> {
        self.trusted_proxies.as_deref()
    }

    /// Evaluates the trust gate for a physical peer against this context.
    pub fn is_trusted_proxy(&self, remote: Option<SocketAddr>) -> bool {
        canon_http::forwarded::is_trusted(self.trust_policy, self.trusted_proxies(), remote)
    }
}

impl fmt::Debug for ServerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContext")
            .field("default_request_charset", &self.default_request_charset)
            .field("default_response_charset", &self.default_response_charset)
            .field("trust_policy", &self.trust_policy)
            .field("trusted_proxies", &self.trusted_proxies.as_ref().map(|_| ".."))
            .finish()
    }
}

/// Builder for [`ServerContext`]; all validation happens in [`build`].
///
/// [`build`]: ServerContextBuilder::build
#[derive(Default)]
pub struct ServerContextBuilder {
    default_request_charset: Option<String>,
    default_response_charset: Option<String>,
    trust_policy: TrustPolicy,
    trusted_proxies: Option<Arc<TrustedProxyPredicate>>,
}

impl ServerContextBuilder {
    /// Sets the default charset label for request bodies.
    pub fn default_request_charset<S: Into<String>>(mut self, label: S) -> Self {
        self.default_request_charset = Some(label.into());
        self
    }

    /// Sets the default charset label for response bodies.
    pub fn default_response_charset<S: Into<String>>(mut self, label: S) -> Self {
        self.default_response_charset = Some(label.into());
        self
    }

    /// Sets the trust policy for forwarding headers.
    pub fn trust_policy(mut self, policy: TrustPolicy) -> Self {
        self.trust_policy = policy;
        self
    }

    /// Sets the allowlist predicate consulted under [`TrustPolicy::Allowlist`].
    pub fn trusted_proxies<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&SocketAddr) -> bool + Send + Sync + 'static,
    {
        self.trusted_proxies = Some(Arc::new(predicate));
        self
    }

    /// Validates and assembles the context.
    ///
    /// Fails on an unknown charset label and on `Allowlist` without a
    /// predicate.
    pub fn build(self) -> Result<ServerContext, ConfigError> {
        let default_request_charset = self.default_request_charset.map(|l| resolve_label(&l)).transpose()?;
        let default_response_charset = self.default_response_charset.map(|l| resolve_label(&l)).transpose()?;

        if self.trust_policy == TrustPolicy::Allowlist && self.trusted_proxies.is_none() {
            return Err(ConfigError::MissingTrustedProxyPredicate);
        }

        Ok(ServerContext {
            default_request_charset,
            default_response_charset,
            trust_policy: self.trust_policy,
            trusted_proxies: self.trusted_proxies,
        })
    }
}

impl fmt::Debug for ServerContextBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerContextBuilder")
            .field("default_request_charset", &self.default_request_charset)
            .field("default_response_charset", &self.default_response_charset)
            .field("trust_policy", &self.trust_policy)
            .field("trusted_proxies", &self.trusted_proxies.as_ref().map(|_| ".."))
            .finish()
    }
}

fn resolve_label(label: &str) -> Result<Charset, ConfigError> {
    Charset::for_label(label).ok_or_else(|| ConfigError::UnknownCharset { label: label.to_string() })
}

/// A context holder shared across requests, swappable as one atomic unit.
///
/// Requests take a snapshot at construction and never observe a partial
/// reconfiguration; a [`store`] replaces the whole snapshot for requests
/// that start afterwards.
///
/// [`store`]: SharedContext::store
#[derive(Debug, Clone)]
pub struct SharedContext {
    inner: Arc<ArcSwap<ServerContext>>,
}

impl SharedContext {
    /// Wraps a context for sharing.
    pub fn new(context: ServerContext) -> Self {
        Self { inner: Arc::new(ArcSwap::from_pointee(context)) }
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<ServerContext> {
        self.inner.load_full()
    }

    /// Replaces the snapshot for subsequent requests.
    pub fn store(&self, context: ServerContext) {
        self.inner.store(Arc::new(context));
    }
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new(ServerContext::default())
    }
}

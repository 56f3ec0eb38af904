//! Administrative and stats clients for the proxy engine.
//!
//! The agent only needs four calls against the engine: add a user, remove
//! a user by label, and read cumulative uplink/downlink counters. Both
//! surfaces are traits so cycles can be driven against the real engine or
//! an in-memory stand-in.

mod http;
mod memory;

pub use http::HttpProxyApi;
pub use memory::{Call, MemoryProxy};

use std::sync::Arc;

use async_trait::async_trait;

use crate::model::AddUserRequest;

/// Proxy engine API error.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    /// Transport-level failure (connect, timeout, decode).
    #[error("transport error: {0}")]
    Transport(String),

    /// The engine rejected the call.
    #[error("api error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// The engine does not know the user.
    #[error("user not found: {0}")]
    NotFound(String),
}

impl ProxyError {
    /// Create a transport error from any displayable error.
    #[inline]
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        Self::Transport(err.to_string())
    }
}

/// Administrative surface of the engine: user provisioning.
#[async_trait]
pub trait HandlerApi: Send + Sync {
    /// Add a user to the managed inbound.
    async fn add_user(&self, request: &AddUserRequest) -> Result<(), ProxyError>;

    /// Remove a user from the managed inbound by email label.
    async fn remove_user(&self, email: &str) -> Result<(), ProxyError>;
}

/// Stats surface of the engine: cumulative per-user traffic counters.
///
/// Counters are reset on read, so each call returns the delta since the
/// previous read.
#[async_trait]
pub trait StatsApi: Send + Sync {
    /// Read and reset the uplink counter for a user.
    async fn user_uplink(&self, email: &str) -> Result<u64, ProxyError>;

    /// Read and reset the downlink counter for a user.
    async fn user_downlink(&self, email: &str) -> Result<u64, ProxyError>;
}

/// Blanket implementation for `Arc<H>` where `H: HandlerApi`.
#[async_trait]
impl<H: HandlerApi + ?Sized> HandlerApi for Arc<H> {
    #[inline]
    async fn add_user(&self, request: &AddUserRequest) -> Result<(), ProxyError> {
        (**self).add_user(request).await
    }

    #[inline]
    async fn remove_user(&self, email: &str) -> Result<(), ProxyError> {
        (**self).remove_user(email).await
    }
}

/// Blanket implementation for `Arc<S>` where `S: StatsApi`.
#[async_trait]
impl<S: StatsApi + ?Sized> StatsApi for Arc<S> {
    #[inline]
    async fn user_uplink(&self, email: &str) -> Result<u64, ProxyError> {
        (**self).user_uplink(email).await
    }

    #[inline]
    async fn user_downlink(&self, email: &str) -> Result<u64, ProxyError> {
        (**self).user_downlink(email).await
    }
}

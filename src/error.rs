//! Agent error types.

use crate::proxy::ProxyError;

/// Agent error type.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Database query or connection error.
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),

    /// Proxy engine admin/stats API error.
    #[error("proxy api: {0}")]
    Proxy(#[from] ProxyError),

    /// Configuration error.
    #[error("config: {0}")]
    Config(String),

    /// The configured node does not exist in the panel database.
    #[error("node {0} not found in panel database")]
    NodeNotFound(i64),

    /// Unrecoverable provisioning failure.
    ///
    /// Raised when adding a user fails and the node is not configured to
    /// tolerate invalid credentials. The run loop treats this as a
    /// deliberate halt signal rather than an ordinary cycle error, since
    /// the same misconfiguration would otherwise repeat every cycle.
    #[error("unrecoverable provisioning failure: {0}")]
    FatalProvisioning(String),
}

impl AgentError {
    /// Whether this error should halt the process instead of being
    /// retried on the next cycle.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalProvisioning(_))
    }
}

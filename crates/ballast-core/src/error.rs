//! Error types shared across the ballast crates.

use thiserror::Error;

/// Result type alias for ballast operations.
pub type BallastResult<T> = Result<T, BallastError>;

/// Errors that can occur while rebalancing.
///
/// Degenerate-but-expected states (zero total capacity, a listener whose
/// merged weights sum to zero) are not errors; they surface as skip
/// outcomes in the rebalance report.
#[derive(Debug, Error)]
pub enum BallastError {
    /// Invocation input is missing or malformed. Raised before any
    /// external call; always fatal.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A referenced entity (load balancer, target group, listener, or
    /// member) does not exist. Fatal only for the branch that referenced
    /// it; sibling work continues.
    #[error("not found: {0}")]
    NotFound(String),

    /// Connectivity, throttling, or another transient control plane
    /// failure that survived the provider's bounded retries.
    #[error("control plane error: {0}")]
    Api(String),
}

impl BallastError {
    /// Whether this error names a missing entity rather than a failed call.
    pub fn is_not_found(&self) -> bool {
        matches!(self, BallastError::NotFound(_))
    }
}

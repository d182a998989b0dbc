//! Error taxonomy shared by every crate in the workspace

use thiserror::Error;

/// Every failure the SDK can surface, partitioned by who is at fault and
/// what the caller can do about it.
///
/// `Validation` is always raised locally, before any network round-trip.
/// `Network` is the only class worth retrying as-is; nothing is retried
/// internally.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FhevmError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("FHEVM instance not initialized, call init() first")]
    NotInitialized,

    #[error("engine load failed: {0}")]
    EngineLoad(String),

    #[error("signature request rejected by wallet")]
    UserRejected,

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("network error: {0}")]
    Network(String),
}

impl FhevmError {
    pub fn validation(msg: impl Into<String>) -> Self {
        FhevmError::Validation(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        FhevmError::Protocol(msg.into())
    }

    pub fn network(msg: impl Into<String>) -> Self {
        FhevmError::Network(msg.into())
    }

    /// True when retrying the same call unchanged could succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FhevmError::Network(_))
    }
}

pub type Result<T> = std::result::Result<T, FhevmError>;

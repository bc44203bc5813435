//! Error types for Synheart Sync

use crate::types::MetricKind;
use thiserror::Error;

/// Errors reported by a fitness provider for a single outbound call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("Transport failure: {0}")]
    Transport(String),

    #[error("Permission revoked for {0}")]
    PermissionRevoked(String),

    #[error("Malformed provider response: {0}")]
    MalformedResponse(String),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),

    #[error("Provider call timed out after {0}s")]
    Timeout(u64),
}

/// Errors raised by the authorization handshake
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Authorization denied: {message}")]
    Denied { message: String },

    #[error("Authorization failed: {0}")]
    Provider(#[from] ProviderError),
}

/// Failure of a single metric fetch; never affects sibling metrics
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Failed to fetch {kind}: {source}")]
pub struct FetchError {
    pub kind: MetricKind,
    #[source]
    pub source: ProviderError,
}

impl FetchError {
    pub fn new(kind: MetricKind, source: ProviderError) -> Self {
        Self { kind, source }
    }
}

/// Invalid sync configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Sync interval must be greater than zero")]
    ZeroInterval,

    #[error("Fetch timeout must be greater than zero")]
    ZeroTimeout,

    #[error("At least one metric must be configured")]
    NoMetrics,

    #[error("Invalid bucketing for {kind}: {reason}")]
    InvalidBucketing { kind: MetricKind, reason: String },
}

/// Errors that can occur while driving a sync coordinator
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Activity permission denied")]
    PermissionDenied,

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid coordinator state: {0}")]
    InvalidState(String),
}

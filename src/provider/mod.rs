//! Fitness provider seam
//!
//! The provider SDK (permission prompt, authorization handshake, sample
//! retrieval) is an opaque remote service. This module defines the async
//! contract the sync client drives, plus two implementations: a JSON fixture
//! provider and, behind the `test-util` feature, a scripted fake for tests.

mod fixture;
#[cfg(any(test, feature = "test-util"))]
mod scripted;

pub use fixture::FixtureProvider;
#[cfg(any(test, feature = "test-util"))]
pub use scripted::{ProviderCall, ScriptedProvider};

use crate::error::ProviderError;
use crate::types::{Bucketing, MetricKind, Scope, SourceSamples, TimeWindow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Platform permission the provider can prompt for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ActivityRecognition,
}

/// Outcome of the authorization handshake as reported by the provider
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthResult {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthResult {
    pub fn granted() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    pub fn denied(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

/// Trait for fitness data providers
#[async_trait]
pub trait FitnessProvider: Send + Sync {
    /// Show the platform permission prompt; `Ok(true)` only on explicit grant
    async fn request_permission(&self, permission: Permission) -> Result<bool, ProviderError>;

    /// Request read access for `scopes`
    async fn authorize(&self, scopes: &BTreeSet<Scope>) -> Result<AuthResult, ProviderError>;

    /// Fetch raw samples for `kind` within `window`, grouped by data source in
    /// provider order
    async fn get_samples(
        &self,
        kind: MetricKind,
        window: &TimeWindow,
        bucketing: Option<Bucketing>,
    ) -> Result<Vec<SourceSamples>, ProviderError>;

    /// Release the provider session
    async fn disconnect(&self);

    /// Provider name for logs
    fn name(&self) -> &'static str {
        "provider"
    }
}

//! JSON fixture provider
//!
//! Serves provider responses from a recorded JSON document. Samples are
//! filtered to the requested window the way a live provider would.

use crate::error::{ProviderError, SyncError};
use crate::types::{Bucketing, MetricKind, Scope, SourceSamples, TimeWindow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

use super::{AuthResult, FitnessProvider, Permission};

/// Provider backed by a fixture document
#[derive(Debug)]
pub struct FixtureProvider {
    fixture: Fixture,
    connected: AtomicBool,
}

impl FixtureProvider {
    /// Parse a fixture document
    pub fn from_json(raw_json: &str) -> Result<Self, SyncError> {
        let fixture: Fixture = serde_json::from_str(raw_json)?;
        Ok(Self {
            fixture,
            connected: AtomicBool::new(false),
        })
    }

    /// Override the recorded permission outcome
    pub fn with_permission(mut self, granted: bool) -> Self {
        self.fixture.permission_granted = granted;
        self
    }

    /// Override the recorded authorization outcome
    pub fn with_authorization(mut self, result: AuthResult) -> Self {
        self.fixture.authorization = result;
        self
    }

    /// Number of samples recorded per metric, across all sources
    pub fn sample_counts(&self) -> HashMap<MetricKind, usize> {
        self.fixture
            .metrics
            .iter()
            .map(|(kind, sources)| (*kind, sources.iter().map(|s| s.samples.len()).sum()))
            .collect()
    }

    /// Metrics the fixture is scripted to fail
    pub fn failing_metrics(&self) -> Vec<MetricKind> {
        let mut kinds: Vec<MetricKind> = self.fixture.failures.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FitnessProvider for FixtureProvider {
    async fn request_permission(&self, _permission: Permission) -> Result<bool, ProviderError> {
        Ok(self.fixture.permission_granted)
    }

    async fn authorize(&self, scopes: &BTreeSet<Scope>) -> Result<AuthResult, ProviderError> {
        debug!("Fixture authorize with {} scopes", scopes.len());
        let result = self.fixture.authorization.clone();
        if result.success {
            self.connected.store(true, Ordering::SeqCst);
        }
        Ok(result)
    }

    async fn get_samples(
        &self,
        kind: MetricKind,
        window: &TimeWindow,
        _bucketing: Option<Bucketing>,
    ) -> Result<Vec<SourceSamples>, ProviderError> {
        if !self.is_connected() {
            return Err(ProviderError::PermissionRevoked(kind.to_string()));
        }
        if let Some(message) = self.fixture.failures.get(&kind) {
            return Err(ProviderError::Transport(message.clone()));
        }

        let sources = self
            .fixture
            .metrics
            .get(&kind)
            .map(|sources| {
                sources
                    .iter()
                    .map(|source| SourceSamples {
                        source_id: source.source_id.clone(),
                        samples: source
                            .samples
                            .iter()
                            .filter(|s| window.contains(&s.timestamp))
                            .cloned()
                            .collect(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(sources)
    }

    async fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    fn name(&self) -> &'static str {
        "fixture"
    }
}

// Fixture document structures

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Fixture {
    #[serde(default = "default_true")]
    permission_granted: bool,
    #[serde(default = "AuthResult::granted")]
    authorization: AuthResult,
    #[serde(default)]
    metrics: HashMap<MetricKind, Vec<SourceSamples>>,
    /// Metrics whose fetch fails, with the transport error message
    #[serde(default)]
    failures: HashMap<MetricKind, String>,
}

fn default_true() -> bool {
    true
}

//! Metric fetching and reduction
//!
//! One `MetricFetcher` per metric kind. A fetch requests raw samples for a
//! window and reduces them to a single display value:
//!
//! - **Steps**: sum of the first data source that reports any samples; later
//!   sources are ignored.
//! - **Heart rate / SpO2**: the most recent sample.
//!
//! `Ok(None)` means the provider had nothing new; the caller keeps its prior
//! value. Provider failures become `FetchError` and are never retried here.

use crate::error::{FetchError, ProviderError};
use crate::provider::FitnessProvider;
use crate::types::{Bucketing, MetricKind, SourceSamples, TimeWindow};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct MetricFetcher {
    kind: MetricKind,
    provider: Arc<dyn FitnessProvider>,
    bucketing: Option<Bucketing>,
    timeout: Option<Duration>,
}

impl MetricFetcher {
    pub fn new(kind: MetricKind, provider: Arc<dyn FitnessProvider>) -> Self {
        Self {
            kind,
            provider,
            bucketing: None,
            timeout: None,
        }
    }

    pub fn with_bucketing(mut self, bucketing: Option<Bucketing>) -> Self {
        self.bucketing = bucketing;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn kind(&self) -> MetricKind {
        self.kind
    }

    /// Fetch and reduce samples for `window`
    pub async fn fetch(&self, window: &TimeWindow) -> Result<Option<f64>, FetchError> {
        let request = self.provider.get_samples(self.kind, window, self.bucketing);

        let sources = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, request).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout(limit.as_secs())),
            },
            None => request.await,
        }
        .map_err(|e| FetchError::new(self.kind, e))?;

        let value = reduce(self.kind, &sources);
        debug!(
            "Fetched {} from {} sources: {:?}",
            self.kind,
            sources.len(),
            value
        );
        Ok(value)
    }
}

/// Reduce provider sources to one value using the policy for `kind`
pub fn reduce(kind: MetricKind, sources: &[SourceSamples]) -> Option<f64> {
    match kind {
        MetricKind::Steps => reduce_steps(sources),
        MetricKind::HeartRate | MetricKind::Spo2 => reduce_latest(sources),
    }
}

/// Sum of the first source with any samples
pub fn reduce_steps(sources: &[SourceSamples]) -> Option<f64> {
    sources
        .iter()
        .find(|source| !source.samples.is_empty())
        .map(|source| source.samples.iter().map(|s| s.value).sum())
}

/// Value of the most recent sample across all sources.
///
/// Ties on timestamp go to the sample the provider returned last.
pub fn reduce_latest(sources: &[SourceSamples]) -> Option<f64> {
    sources
        .iter()
        .flat_map(|source| source.samples.iter())
        .max_by_key(|s| s.timestamp)
        .map(|s| s.value)
}

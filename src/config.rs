//! Sync configuration
//!
//! Loaded from JSON; every field has a default matching the reference
//! behavior (all three metrics, 15 minute refresh, daily buckets for heart
//! rate and SpO2).

use crate::error::ConfigError;
use crate::types::{Bucketing, MetricKind, Scope};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Default refresh interval (15 minutes)
pub const DEFAULT_INTERVAL_SECS: u64 = 15 * 60;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between periodic fetch cycles
    pub interval_secs: u64,
    /// Metrics to track, in display order
    pub metrics: Vec<MetricKind>,
    /// Bucketing requested for heart rate samples
    pub heart_rate_bucketing: Option<Bucketing>,
    /// Bucketing requested for SpO2 samples
    pub spo2_bucketing: Option<Bucketing>,
    /// Per-fetch timeout; unset means wait for the provider
    pub fetch_timeout_secs: Option<u64>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_INTERVAL_SECS,
            metrics: MetricKind::ALL.to_vec(),
            heart_rate_bucketing: Some(Bucketing::daily()),
            spo2_bucketing: Some(Bucketing::daily()),
            fetch_timeout_secs: None,
        }
    }
}

impl SyncConfig {
    /// Parse and validate a JSON config
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let mut config: SyncConfig = serde_json::from_str(json)?;
        config.dedup_metrics();
        config.validate()?;
        Ok(config)
    }

    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.interval_secs == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.fetch_timeout_secs == Some(0) {
            return Err(ConfigError::ZeroTimeout);
        }
        if self.metrics.is_empty() {
            return Err(ConfigError::NoMetrics);
        }
        for (kind, bucketing) in [
            (MetricKind::HeartRate, self.heart_rate_bucketing),
            (MetricKind::Spo2, self.spo2_bucketing),
        ] {
            if let Some(b) = bucketing {
                if b.interval == 0 {
                    return Err(ConfigError::InvalidBucketing {
                        kind,
                        reason: "interval must be greater than zero".to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    /// Drop repeated metrics, keeping first occurrence order
    pub fn dedup_metrics(&mut self) {
        let mut seen = BTreeSet::new();
        self.metrics.retain(|kind| seen.insert(*kind));
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout_secs.map(Duration::from_secs)
    }

    /// Bucketing to request for `kind`; steps are never bucketed
    pub fn bucketing_for(&self, kind: MetricKind) -> Option<Bucketing> {
        match kind {
            MetricKind::Steps => None,
            MetricKind::HeartRate => self.heart_rate_bucketing,
            MetricKind::Spo2 => self.spo2_bucketing,
        }
    }

    /// Scope set the authorization handshake must request
    pub fn scopes(&self) -> BTreeSet<Scope> {
        Scope::for_metrics(&self.metrics)
    }
}

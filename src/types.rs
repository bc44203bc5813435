//! Core types for Synheart Sync
//!
//! This module defines the data that flows between the provider, the metric
//! fetchers and the sync coordinator: metric kinds and scopes, fetch windows,
//! raw samples, the in-memory snapshot and the status the coordinator exposes.

use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Tracked health measurement type
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Steps,
    HeartRate,
    Spo2,
}

impl MetricKind {
    /// Every metric kind, in display order
    pub const ALL: [MetricKind; 3] = [MetricKind::Steps, MetricKind::HeartRate, MetricKind::Spo2];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Steps => "steps",
            MetricKind::HeartRate => "heart_rate",
            MetricKind::Spo2 => "spo2",
        }
    }

    /// Human-readable label used on display cards
    pub fn label(&self) -> &'static str {
        match self {
            MetricKind::Steps => "Steps",
            MetricKind::HeartRate => "Heart Rate",
            MetricKind::Spo2 => "SpO2",
        }
    }

    /// Display unit, if the metric has one
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            MetricKind::Steps => None,
            MetricKind::HeartRate => Some("bpm"),
            MetricKind::Spo2 => Some("%"),
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Provider-defined permission grant unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    ActivityRead,
    BodyRead,
    HeartRateRead,
    OxygenSaturationRead,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::ActivityRead => "fitness.activity.read",
            Scope::BodyRead => "fitness.body.read",
            Scope::HeartRateRead => "fitness.heart_rate.read",
            Scope::OxygenSaturationRead => "fitness.oxygen_saturation.read",
        }
    }

    /// Scopes a metric needs read access to
    pub fn for_metric(kind: MetricKind) -> &'static [Scope] {
        match kind {
            MetricKind::Steps => &[Scope::ActivityRead, Scope::BodyRead],
            MetricKind::HeartRate => &[Scope::HeartRateRead],
            MetricKind::Spo2 => &[Scope::OxygenSaturationRead],
        }
    }

    /// Union of the scopes needed by every given metric
    pub fn for_metrics<'a, I>(kinds: I) -> BTreeSet<Scope>
    where
        I: IntoIterator<Item = &'a MetricKind>,
    {
        kinds
            .into_iter()
            .flat_map(|k| Scope::for_metric(*k).iter().copied())
            .collect()
    }
}

/// Authorization state against the external provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    #[default]
    Unauthorized,
    Authorized,
}

// Granularity and reach of the search for the first local instant of a day
const DAY_START_SEARCH_MINUTES: i64 = 15;
const DAY_START_SEARCH_STEPS: i64 = 4 * 24;

/// Fetch window `[start, end]`, fixed for the duration of one fetch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Window from the start of `now`'s calendar day (in `now`'s timezone) to `now`
    pub fn today_until<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        let tz = now.timezone();
        let midnight = now.date_naive().and_time(NaiveTime::MIN);
        // A DST gap can skip local midnight; the day then starts at the first
        // local instant that exists
        let start = (0..=DAY_START_SEARCH_STEPS)
            .map(|step| midnight + Duration::minutes(DAY_START_SEARCH_MINUTES * step))
            .find_map(|local| local.and_local_timezone(tz.clone()).earliest())
            .unwrap_or_else(|| now.clone());

        Self {
            start: start.with_timezone(&Utc),
            end: now.with_timezone(&Utc),
        }
    }

    pub fn contains(&self, at: &DateTime<Utc>) -> bool {
        *at >= self.start && *at <= self.end
    }
}

/// Bucket unit for aggregated provider queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BucketUnit {
    Minute,
    Hour,
    Day,
}

/// Aggregation bucket requested from the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bucketing {
    pub interval: u32,
    pub unit: BucketUnit,
}

impl Bucketing {
    pub const fn daily() -> Self {
        Self {
            interval: 1,
            unit: BucketUnit::Day,
        }
    }
}

/// A single raw measurement returned by the provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

/// Samples reported by one provider data source, in chronological order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSamples {
    pub source_id: String,
    #[serde(default)]
    pub samples: Vec<Sample>,
}

/// Last successfully fetched value for one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricReading {
    pub value: f64,
    pub fetched_at: DateTime<Utc>,
}

/// In-memory snapshot of the latest value per metric.
///
/// A missing entry means the metric was never successfully fetched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSnapshot {
    readings: BTreeMap<MetricKind, MetricReading>,
}

impl MetricSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, kind: MetricKind) -> Option<&MetricReading> {
        self.readings.get(&kind)
    }

    pub fn value(&self, kind: MetricKind) -> Option<f64> {
        self.readings.get(&kind).map(|r| r.value)
    }

    pub fn set(&mut self, kind: MetricKind, value: f64, fetched_at: DateTime<Utc>) {
        self.readings
            .insert(kind, MetricReading { value, fetched_at });
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetricKind, &MetricReading)> {
        self.readings.iter().map(|(k, r)| (*k, r))
    }
}

/// Coordinator lifecycle state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorState {
    #[default]
    Idle,
    Initializing,
    Authorizing,
    Authorized,
    Synced,
    UnauthorizedFailed,
    Stopped,
}

impl CoordinatorState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CoordinatorState::Stopped)
    }
}

/// Result of one metric within a fetch cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum MetricOutcome {
    Updated(f64),
    NoNewValue,
    Failed(String),
}

/// Aggregate health of a completed fetch cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleHealth {
    /// No metric failed
    Complete,
    /// Some, but not all, metrics failed
    Partial,
    /// Every metric failed
    Failed,
}

/// Record of one settled fetch cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub window: TimeWindow,
    pub outcomes: BTreeMap<MetricKind, MetricOutcome>,
}

impl CycleReport {
    pub fn failed_metrics(&self) -> Vec<MetricKind> {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, MetricOutcome::Failed(_)))
            .map(|(k, _)| *k)
            .collect()
    }

    pub fn health(&self) -> CycleHealth {
        let failed = self.failed_metrics().len();
        if failed == 0 {
            CycleHealth::Complete
        } else if failed == self.outcomes.len() {
            CycleHealth::Failed
        } else {
            CycleHealth::Partial
        }
    }
}

/// Sync status exposed to the host
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// When the last fetch cycle settled
    pub last_sync_at: Option<DateTime<Utc>>,
    pub authorization: AuthorizationState,
    pub state: CoordinatorState,
    /// Health of the last settled cycle
    pub last_cycle: Option<CycleHealth>,
    /// Why startup failed, when `state` is `UnauthorizedFailed`
    pub failure: Option<String>,
}

impl SyncStatus {
    pub fn is_connected(&self) -> bool {
        self.authorization == AuthorizationState::Authorized
    }
}

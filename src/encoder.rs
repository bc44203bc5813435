//! Snapshot encoding
//!
//! Renders a metric snapshot and sync status into display cards and a JSON
//! payload for host UIs. Unset metrics render as `--` (steps as `0`), and the
//! status lines read `Connected` / `Not connected` and `Not synced` until the
//! first cycle settles.

use crate::error::SyncError;
use crate::types::{CycleHealth, MetricKind, MetricSnapshot, SyncStatus};
use crate::{PRODUCER_NAME, SYNC_VERSION};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Current payload schema version
pub const PAYLOAD_VERSION: &str = "1.0.0";

/// Placeholder for a metric that was never fetched
pub const MISSING_VALUE: &str = "--";

/// Producer metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Producer {
    pub name: String,
    pub version: String,
    pub instance_id: String,
}

/// One rendered metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayCard {
    pub metric: MetricKind,
    pub label: String,
    pub value: String,
    pub unit: Option<String>,
    pub fetched_at_utc: Option<String>,
}

/// Rendered status section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLines {
    pub last_synced: String,
    pub connection: String,
    pub last_cycle: Option<CycleHealth>,
    pub failure: Option<String>,
}

/// Complete snapshot payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub payload_version: String,
    pub producer: Producer,
    pub encoded_at_utc: String,
    pub status: StatusLines,
    pub cards: Vec<DisplayCard>,
}

/// Encoder for snapshot payloads
pub struct SnapshotEncoder {
    instance_id: String,
}

impl Default for SnapshotEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotEncoder {
    /// Create a new encoder with a unique instance ID
    pub fn new() -> Self {
        Self {
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Create an encoder with a specific instance ID
    pub fn with_instance_id(instance_id: String) -> Self {
        Self { instance_id }
    }

    /// One card per metric, in the order given
    pub fn cards(&self, snapshot: &MetricSnapshot, metrics: &[MetricKind]) -> Vec<DisplayCard> {
        metrics
            .iter()
            .map(|kind| {
                let reading = snapshot.get(*kind);
                let value = match (reading, kind) {
                    (Some(r), _) => format_value(r.value),
                    (None, MetricKind::Steps) => "0".to_string(),
                    (None, _) => MISSING_VALUE.to_string(),
                };
                DisplayCard {
                    metric: *kind,
                    label: kind.label().to_string(),
                    value,
                    unit: kind.unit().map(str::to_string),
                    fetched_at_utc: reading.map(|r| r.fetched_at.to_rfc3339()),
                }
            })
            .collect()
    }

    pub fn status_lines(&self, status: &SyncStatus) -> StatusLines {
        StatusLines {
            last_synced: status
                .last_sync_at
                .map(format_sync_time)
                .unwrap_or_else(|| "Not synced".to_string()),
            connection: if status.is_connected() {
                "Connected".to_string()
            } else {
                "Not connected".to_string()
            },
            last_cycle: status.last_cycle,
            failure: status.failure.clone(),
        }
    }

    pub fn encode(
        &self,
        snapshot: &MetricSnapshot,
        status: &SyncStatus,
        metrics: &[MetricKind],
    ) -> SnapshotPayload {
        SnapshotPayload {
            payload_version: PAYLOAD_VERSION.to_string(),
            producer: Producer {
                name: PRODUCER_NAME.to_string(),
                version: SYNC_VERSION.to_string(),
                instance_id: self.instance_id.clone(),
            },
            encoded_at_utc: Utc::now().to_rfc3339(),
            status: self.status_lines(status),
            cards: self.cards(snapshot, metrics),
        }
    }

    /// Encode to a pretty JSON string
    pub fn encode_to_json(
        &self,
        snapshot: &MetricSnapshot,
        status: &SyncStatus,
        metrics: &[MetricKind],
    ) -> Result<String, SyncError> {
        let payload = self.encode(snapshot, status, metrics);
        serde_json::to_string_pretty(&payload).map_err(SyncError::Json)
    }
}

/// Integral values print without a fraction (`7`, not `7.0`)
fn format_value(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn format_sync_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%H:%M:%S").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuthorizationState, CoordinatorState};
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap()
    }

    #[test]
    fn test_cards_for_empty_snapshot() {
        let encoder = SnapshotEncoder::with_instance_id("test".into());
        let cards = encoder.cards(&MetricSnapshot::new(), &MetricKind::ALL);

        let values: Vec<(&str, &str)> = cards
            .iter()
            .map(|c| (c.label.as_str(), c.value.as_str()))
            .collect();
        assert_eq!(
            values,
            vec![("Steps", "0"), ("Heart Rate", "--"), ("SpO2", "--")]
        );
        assert_eq!(cards[1].unit.as_deref(), Some("bpm"));
        assert_eq!(cards[2].unit.as_deref(), Some("%"));
        assert!(cards.iter().all(|c| c.fetched_at_utc.is_none()));
    }

    #[test]
    fn test_cards_format_values() {
        let mut snapshot = MetricSnapshot::new();
        snapshot.set(MetricKind::Steps, 8421.0, at());
        snapshot.set(MetricKind::HeartRate, 71.5, at());

        let encoder = SnapshotEncoder::new();
        let cards = encoder.cards(&snapshot, &[MetricKind::HeartRate, MetricKind::Steps]);

        assert_eq!(cards[0].value, "71.5");
        assert_eq!(cards[1].value, "8421");
        assert_eq!(cards[1].fetched_at_utc.as_deref(), Some("2024-01-15T08:30:00+00:00"));
    }

    #[test]
    fn test_status_lines() {
        let encoder = SnapshotEncoder::new();

        let idle = encoder.status_lines(&SyncStatus::default());
        assert_eq!(idle.last_synced, "Not synced");
        assert_eq!(idle.connection, "Not connected");

        let synced = encoder.status_lines(&SyncStatus {
            last_sync_at: Some(at()),
            authorization: AuthorizationState::Authorized,
            state: CoordinatorState::Synced,
            last_cycle: Some(CycleHealth::Partial),
            failure: None,
        });
        assert_eq!(synced.connection, "Connected");
        assert_eq!(synced.last_synced, format_sync_time(at()));
        assert_eq!(synced.last_cycle, Some(CycleHealth::Partial));
    }

    #[test]
    fn test_encode_to_json() {
        let encoder = SnapshotEncoder::with_instance_id("instance-1".into());
        let json = encoder
            .encode_to_json(&MetricSnapshot::new(), &SyncStatus::default(), &MetricKind::ALL)
            .unwrap();
        let payload: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(payload["payload_version"], "1.0.0");
        assert_eq!(payload["producer"]["name"], "synheart-sync");
        assert_eq!(payload["producer"]["instance_id"], "instance-1");
        assert_eq!(payload["cards"].as_array().unwrap().len(), 3);
        assert_eq!(payload["cards"][0]["metric"], "steps");
        assert_eq!(payload["status"]["connection"], "Not connected");
    }
}

//! Synheart Sync - Polling sync client for wearable fitness providers
//!
//! Sync acquires activity permission, authorizes against a fitness provider,
//! and keeps an in-memory snapshot of daily metrics fresh: permission →
//! authorization → initial fetch → periodic refresh, with every metric fetched
//! independently so one failure never clears another metric's value.
//!
//! ## Modules
//!
//! - **Coordinator**: lifecycle, timer and fetch cycles (`SyncCoordinator`)
//! - **Provider**: the async provider seam plus fixture and scripted providers
//! - **Encoder**: display cards and JSON payloads for host UIs

pub mod auth;
pub mod clock;
pub mod config;
pub mod coordinator;
pub mod encoder;
pub mod error;
pub mod fetcher;
pub mod permission;
pub mod provider;
pub mod types;

pub use config::SyncConfig;
pub use coordinator::{SkipReason, SyncCoordinator, SyncOutcome};
pub use encoder::SnapshotEncoder;
pub use error::{AuthError, FetchError, ProviderError, SyncError};
pub use provider::{FitnessProvider, FixtureProvider};
#[cfg(any(test, feature = "test-util"))]
pub use provider::ScriptedProvider;
pub use types::{MetricKind, MetricSnapshot, SyncStatus, TimeWindow};

/// Sync version embedded in all payloads
pub const SYNC_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for payloads
pub const PRODUCER_NAME: &str = "synheart-sync";

//! Sync coordination
//!
//! `SyncCoordinator` drives the whole lifecycle:
//!
//! 1. `start()` - request activity permission, authorize the full scope set,
//!    run one fetch cycle, then arm the periodic timer.
//! 2. Every tick (and every `sync_now()`) runs a fetch cycle while synced.
//! 3. `stop()` - cancel the timer and release the provider session.
//!
//! A fetch cycle fans out one fetch per configured metric, joins them all,
//! applies each success to the snapshot independently, and only then stamps
//! `last_sync_at`. Cycles never overlap: a tick or manual trigger that arrives
//! while a cycle is in flight is dropped.

use crate::auth::AuthSession;
use crate::clock::{Clock, SystemClock};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::fetcher::MetricFetcher;
use crate::permission::PermissionGate;
use crate::provider::FitnessProvider;
use crate::types::{
    CoordinatorState, CycleHealth, CycleReport, MetricKind, MetricOutcome, MetricSnapshot,
    SyncStatus,
};
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Why a requested fetch cycle did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// The coordinator is not synced against the provider
    NotAuthorized,
    /// Another cycle is still in flight
    CycleInFlight,
    /// The coordinator stopped while the cycle was running; results discarded
    Stopped,
}

/// Result of a request to run a fetch cycle
#[derive(Debug, Clone, PartialEq)]
pub enum SyncOutcome {
    Completed(CycleReport),
    Skipped(SkipReason),
}

impl SyncOutcome {
    pub fn report(&self) -> Option<&CycleReport> {
        match self {
            SyncOutcome::Completed(report) => Some(report),
            SyncOutcome::Skipped(_) => None,
        }
    }
}

/// Polling sync client for one provider connection
pub struct SyncCoordinator {
    inner: Arc<Inner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

struct Inner {
    config: SyncConfig,
    gate: PermissionGate,
    session: AuthSession,
    fetchers: Vec<MetricFetcher>,
    clock: Arc<dyn Clock>,
    state: RwLock<CoordinatorState>,
    snapshot: RwLock<MetricSnapshot>,
    progress: RwLock<Progress>,
    in_flight: AtomicBool,
    cycles: watch::Sender<Option<CycleReport>>,
}

#[derive(Default)]
struct Progress {
    last_sync_at: Option<chrono::DateTime<chrono::Utc>>,
    last_cycle: Option<CycleHealth>,
    failure: Option<String>,
}

impl SyncCoordinator {
    /// Create a coordinator using the system clock
    pub fn new(provider: Arc<dyn FitnessProvider>, config: SyncConfig) -> Result<Self, SyncError> {
        Self::with_clock(provider, config, Arc::new(SystemClock))
    }

    /// Create a coordinator with a specific clock
    pub fn with_clock(
        provider: Arc<dyn FitnessProvider>,
        mut config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, SyncError> {
        config.dedup_metrics();
        config.validate()?;

        let fetchers = config
            .metrics
            .iter()
            .map(|kind| {
                MetricFetcher::new(*kind, Arc::clone(&provider))
                    .with_bucketing(config.bucketing_for(*kind))
                    .with_timeout(config.fetch_timeout())
            })
            .collect();

        let (cycles, _) = watch::channel(None);

        Ok(Self {
            inner: Arc::new(Inner {
                gate: PermissionGate::new(Arc::clone(&provider)),
                session: AuthSession::new(provider),
                fetchers,
                clock,
                config,
                state: RwLock::new(CoordinatorState::Idle),
                snapshot: RwLock::new(MetricSnapshot::new()),
                progress: RwLock::new(Progress::default()),
                in_flight: AtomicBool::new(false),
                cycles,
            }),
            timer: Mutex::new(None),
        })
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Acquire permission, authorize, run the initial cycle and arm the timer.
    ///
    /// Permission denial and authorization failure are not errors: they leave
    /// the coordinator in `UnauthorizedFailed` with the reason in the status.
    /// Calling `start()` again from there retries the sequence.
    pub async fn start(&self) -> Result<SyncStatus, SyncError> {
        {
            let mut state = write(&self.inner.state);
            match *state {
                CoordinatorState::Idle | CoordinatorState::UnauthorizedFailed => {
                    *state = CoordinatorState::Initializing;
                }
                CoordinatorState::Stopped => {
                    return Err(SyncError::InvalidState(
                        "coordinator has been stopped".to_string(),
                    ));
                }
                other => {
                    return Err(SyncError::InvalidState(format!(
                        "start() called while {other:?}"
                    )));
                }
            }
        }
        write(&self.inner.progress).failure = None;
        info!("Starting sync for {} metrics", self.inner.fetchers.len());

        if !self.inner.gate.request_activity_permission().await {
            self.inner.fail_startup(SyncError::PermissionDenied);
            return Ok(self.status());
        }

        if !self
            .inner
            .transition(CoordinatorState::Initializing, CoordinatorState::Authorizing)
        {
            return Ok(self.status());
        }

        if let Err(e) = self.inner.session.authorize(&self.inner.config.scopes()).await {
            self.inner.fail_startup(SyncError::Auth(e));
            return Ok(self.status());
        }

        if !self
            .inner
            .transition(CoordinatorState::Authorizing, CoordinatorState::Authorized)
        {
            // Stopped during the handshake; don't leak the session
            self.inner.session.disconnect().await;
            return Ok(self.status());
        }

        Arc::clone(&self.inner).run_cycle().await;

        if self
            .inner
            .transition(CoordinatorState::Authorized, CoordinatorState::Synced)
        {
            self.arm_timer();
            info!(
                "Synced; refreshing every {}s",
                self.inner.config.interval_secs
            );
        }

        Ok(self.status())
    }

    /// Run one fetch cycle now. Only runs while synced.
    pub async fn sync_now(&self) -> SyncOutcome {
        match self.inner.state() {
            CoordinatorState::Synced => Arc::clone(&self.inner).run_cycle().await,
            CoordinatorState::Stopped => SyncOutcome::Skipped(SkipReason::Stopped),
            state => {
                debug!("Manual sync ignored while {:?}", state);
                SyncOutcome::Skipped(SkipReason::NotAuthorized)
            }
        }
    }

    /// Cancel the timer and release the provider session. Terminal.
    ///
    /// A cycle already in flight is allowed to settle but its results are
    /// discarded.
    pub async fn stop(&self) {
        let previous =
            std::mem::replace(&mut *write(&self.inner.state), CoordinatorState::Stopped);
        if previous == CoordinatorState::Stopped {
            return;
        }

        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
        self.inner.session.disconnect().await;
        info!("Sync stopped (was {:?})", previous);
    }

    pub fn state(&self) -> CoordinatorState {
        self.inner.state()
    }

    /// Current metric snapshot
    pub fn snapshot(&self) -> MetricSnapshot {
        read(&self.inner.snapshot).clone()
    }

    pub fn status(&self) -> SyncStatus {
        // Lock order is state, then progress (same as a settling cycle)
        let state = self.inner.state();
        let progress = read(&self.inner.progress);
        SyncStatus {
            last_sync_at: progress.last_sync_at,
            authorization: self.inner.session.state(),
            state,
            last_cycle: progress.last_cycle,
            failure: progress.failure.clone(),
        }
    }

    /// Report of the most recent settled cycle
    pub fn last_report(&self) -> Option<CycleReport> {
        self.inner.cycles.borrow().clone()
    }

    /// Watch settled cycle reports
    pub fn subscribe(&self) -> watch::Receiver<Option<CycleReport>> {
        self.inner.cycles.subscribe()
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    fn arm_timer(&self) {
        let inner = Arc::clone(&self.inner);
        let period = inner.config.interval();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match inner.state() {
                    CoordinatorState::Synced => {
                        // Each cycle runs on its own task so cancelling the
                        // timer never cancels a fetch midway
                        tokio::spawn(Arc::clone(&inner).run_cycle());
                    }
                    CoordinatorState::Stopped => break,
                    _ => {}
                }
            }
        });

        if let Some(previous) = lock(&self.timer).replace(handle) {
            previous.abort();
        }
    }
}

impl Drop for SyncCoordinator {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.timer).take() {
            handle.abort();
        }
    }
}

impl Inner {
    fn state(&self) -> CoordinatorState {
        *read(&self.state)
    }

    /// Move `from` → `to`; false if the state changed underneath (e.g. stopped)
    fn transition(&self, from: CoordinatorState, to: CoordinatorState) -> bool {
        let mut state = write(&self.state);
        if *state != from {
            debug!("Skipping transition {:?} -> {:?}: now {:?}", from, to, *state);
            return false;
        }
        *state = to;
        true
    }

    fn fail_startup(&self, reason: SyncError) {
        warn!("Sync startup failed: {}", reason);
        {
            let mut state = write(&self.state);
            if *state == CoordinatorState::Stopped {
                return;
            }
            *state = CoordinatorState::UnauthorizedFailed;
        }
        write(&self.progress).failure = Some(reason.to_string());
    }

    async fn run_cycle(self: Arc<Self>) -> SyncOutcome {
        if !matches!(
            self.state(),
            CoordinatorState::Authorized | CoordinatorState::Synced
        ) || !self.session.is_authorized()
        {
            return SyncOutcome::Skipped(SkipReason::NotAuthorized);
        }
        let Some(_guard) = CycleGuard::acquire(&self.in_flight) else {
            debug!("Fetch cycle already in flight; dropping trigger");
            return SyncOutcome::Skipped(SkipReason::CycleInFlight);
        };

        let started_at = self.clock.now();
        let window = self.clock.today_window();
        debug!("Fetch cycle over {} .. {}", window.start, window.end);

        let clock = &self.clock;
        let results = join_all(self.fetchers.iter().map(|fetcher| async move {
            let result = fetcher.fetch(&window).await;
            (fetcher.kind(), result, clock.now())
        }))
        .await;

        // Held until the results are applied so stop() cannot land in between
        let state = read(&self.state);
        if *state == CoordinatorState::Stopped {
            debug!("Coordinator stopped mid-cycle; discarding results");
            return SyncOutcome::Skipped(SkipReason::Stopped);
        }

        let mut outcomes: BTreeMap<MetricKind, MetricOutcome> = BTreeMap::new();
        {
            let mut snapshot = write(&self.snapshot);
            for (kind, result, fetched_at) in results {
                let outcome = match result {
                    Ok(Some(value)) => {
                        snapshot.set(kind, value, fetched_at);
                        MetricOutcome::Updated(value)
                    }
                    Ok(None) => MetricOutcome::NoNewValue,
                    Err(e) => {
                        warn!("{}; keeping previous value", e);
                        MetricOutcome::Failed(e.to_string())
                    }
                };
                outcomes.insert(kind, outcome);
            }
        }

        let report = CycleReport {
            started_at,
            completed_at: self.clock.now(),
            window,
            outcomes,
        };
        let health = report.health();
        {
            let mut progress = write(&self.progress);
            progress.last_sync_at = Some(report.completed_at);
            progress.last_cycle = Some(health);
        }
        self.cycles.send_replace(Some(report.clone()));
        drop(state);

        info!("Fetch cycle settled: {:?}", health);
        SyncOutcome::Completed(report)
    }
}

/// Holds the in-flight flag for the lifetime of one cycle
struct CycleGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> CycleGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|p| p.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|p| p.into_inner())
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|p| p.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use crate::error::ProviderError;
    use crate::provider::{AuthResult, ProviderCall, ScriptedProvider};
    use crate::types::{AuthorizationState, Sample, SourceSamples};
    use chrono::{FixedOffset, TimeZone, Utc};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    fn clock() -> Arc<FixedClock> {
        let offset = FixedOffset::east_opt(0).unwrap();
        Arc::new(FixedClock::new(
            offset.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap(),
        ))
    }

    fn source(id: &str, values: &[f64]) -> SourceSamples {
        SourceSamples {
            source_id: id.to_string(),
            samples: values
                .iter()
                .enumerate()
                .map(|(i, v)| Sample {
                    timestamp: Utc.with_ymd_and_hms(2024, 1, 15, 8, i as u32, 0).unwrap(),
                    value: *v,
                })
                .collect(),
        }
    }

    fn healthy_provider() -> Arc<ScriptedProvider> {
        Arc::new(
            ScriptedProvider::new()
                .with_sources(MetricKind::Steps, vec![source("watch", &[3.0, 4.0])])
                .with_sources(MetricKind::HeartRate, vec![source("watch", &[60.0, 72.0])])
                .with_sources(MetricKind::Spo2, vec![source("watch", &[97.0])]),
        )
    }

    fn coordinator(provider: Arc<ScriptedProvider>) -> SyncCoordinator {
        SyncCoordinator::with_clock(provider, SyncConfig::default(), clock()).unwrap()
    }

    async fn wait_for_fetches(provider: &ScriptedProvider, count: usize) {
        while provider.fetch_count() < count {
            tokio::task::yield_now().await;
        }
    }

    /// Give spawned cycles a chance to run to completion
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_start_runs_initial_cycle() {
        let provider = healthy_provider();
        let sync = coordinator(provider.clone());

        let status = sync.start().await.unwrap();

        assert_eq!(status.state, CoordinatorState::Synced);
        assert_eq!(status.authorization, AuthorizationState::Authorized);
        assert_eq!(status.last_cycle, Some(CycleHealth::Complete));
        assert_eq!(
            status.last_sync_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap())
        );

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.value(MetricKind::Steps), Some(7.0));
        assert_eq!(snapshot.value(MetricKind::HeartRate), Some(72.0));
        assert_eq!(snapshot.value(MetricKind::Spo2), Some(97.0));

        let calls = provider.calls();
        assert!(matches!(calls[0], ProviderCall::RequestPermission(_)));
        assert_eq!(calls[1], ProviderCall::Authorize(SyncConfig::default().scopes()));
        assert_eq!(provider.fetch_count(), 3);

        sync.stop().await;
    }

    #[tokio::test]
    async fn test_permission_denied_is_terminal_failure() {
        let provider = Arc::new(ScriptedProvider::new().with_permission(Ok(false)));
        let sync = coordinator(provider.clone());

        let status = sync.start().await.unwrap();

        assert_eq!(status.state, CoordinatorState::UnauthorizedFailed);
        assert_eq!(status.authorization, AuthorizationState::Unauthorized);
        assert_eq!(status.failure.as_deref(), Some("Activity permission denied"));
        assert_eq!(provider.calls().len(), 1);
        assert!(sync.snapshot().is_empty());

        assert_eq!(
            sync.sync_now().await,
            SyncOutcome::Skipped(SkipReason::NotAuthorized)
        );
        assert_eq!(provider.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_auth_denied_is_terminal_failure() {
        let provider = Arc::new(
            ScriptedProvider::new().with_authorization(Ok(AuthResult::denied("user cancelled"))),
        );
        let sync = coordinator(provider.clone());

        let status = sync.start().await.unwrap();
        assert_eq!(status.state, CoordinatorState::UnauthorizedFailed);
        assert_eq!(
            status.failure.as_deref(),
            Some("Authorization denied: user cancelled")
        );
        assert_eq!(provider.fetch_count(), 0);
        let calls = provider.calls();

        assert_eq!(
            sync.sync_now().await,
            SyncOutcome::Skipped(SkipReason::NotAuthorized)
        );
        assert_eq!(provider.calls(), calls);
        assert_eq!(provider.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_restart_after_failure_retries_sequence() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_authorization(Err(ProviderError::Transport("offline".into()))),
        );
        let sync = coordinator(provider.clone());
        assert_eq!(
            sync.start().await.unwrap().state,
            CoordinatorState::UnauthorizedFailed
        );

        let again = sync.start().await.unwrap();
        assert_eq!(again.state, CoordinatorState::UnauthorizedFailed);
        let authorizes = provider
            .calls()
            .into_iter()
            .filter(|c| matches!(c, ProviderCall::Authorize(_)))
            .count();
        assert_eq!(authorizes, 2);
    }

    #[tokio::test]
    async fn test_start_twice_is_rejected() {
        let sync = coordinator(healthy_provider());
        sync.start().await.unwrap();

        assert!(matches!(
            sync.start().await,
            Err(SyncError::InvalidState(_))
        ));

        sync.stop().await;
        assert!(matches!(
            sync.start().await,
            Err(SyncError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_now_before_start_is_noop() {
        let provider = healthy_provider();
        let sync = coordinator(provider.clone());

        assert_eq!(
            sync.sync_now().await,
            SyncOutcome::Skipped(SkipReason::NotAuthorized)
        );
        assert!(provider.calls().is_empty());
        assert!(sync.snapshot().is_empty());
        assert_eq!(sync.status().last_sync_at, None);
    }

    #[tokio::test]
    async fn test_failure_isolated_per_metric() {
        let provider = healthy_provider();
        let clock = clock();
        let sync =
            SyncCoordinator::with_clock(provider.clone(), SyncConfig::default(), clock.clone())
                .unwrap();
        sync.start().await.unwrap();

        provider.set_failure(
            MetricKind::HeartRate,
            ProviderError::PermissionRevoked("heart_rate".into()),
        );
        provider.set_sources(MetricKind::Steps, vec![source("watch", &[10.0, 20.0])]);
        clock.advance(chrono::Duration::minutes(5));

        let outcome = sync.sync_now().await;
        let report = outcome.report().unwrap();

        assert_eq!(report.health(), CycleHealth::Partial);
        assert_eq!(report.failed_metrics(), vec![MetricKind::HeartRate]);

        let snapshot = sync.snapshot();
        assert_eq!(snapshot.value(MetricKind::Steps), Some(30.0));
        assert_eq!(snapshot.value(MetricKind::HeartRate), Some(72.0));
        assert_eq!(snapshot.value(MetricKind::Spo2), Some(97.0));

        let status = sync.status();
        assert_eq!(status.last_cycle, Some(CycleHealth::Partial));
        assert_eq!(
            status.last_sync_at,
            Some(Utc.with_ymd_and_hms(2024, 1, 15, 10, 5, 0).unwrap())
        );
        sync.stop().await;
    }

    #[tokio::test]
    async fn test_empty_samples_preserve_previous_value() {
        let provider = healthy_provider();
        let sync = coordinator(provider.clone());
        sync.start().await.unwrap();

        provider.set_sources(MetricKind::Spo2, vec![]);
        provider.set_sources(MetricKind::HeartRate, vec![source("watch", &[])]);

        let report = sync.sync_now().await.report().cloned().unwrap();
        assert_eq!(report.outcomes[&MetricKind::Spo2], MetricOutcome::NoNewValue);
        assert_eq!(sync.snapshot().value(MetricKind::Spo2), Some(97.0));
        assert_eq!(sync.snapshot().value(MetricKind::HeartRate), Some(72.0));
        sync.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_refreshes_while_synced() {
        let provider = healthy_provider();
        let sync = coordinator(provider.clone());
        sync.start().await.unwrap();
        assert_eq!(provider.fetch_count(), 3);

        tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
        // Let the spawned cycle settle
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(provider.fetch_count(), 6);

        sync.stop().await;
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(provider.fetch_count(), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_tick_dropped_while_cycle_in_flight() {
        let provider = healthy_provider();
        let sync = Arc::new(coordinator(provider.clone()));
        sync.start().await.unwrap();

        let gate = Arc::new(Semaphore::new(0));
        provider.set_gate(Some(gate.clone()));
        let manual = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.sync_now().await }
        });
        wait_for_fetches(&provider, 6).await;

        // The tick lands while the manual cycle is still held open
        tokio::time::sleep(Duration::from_secs(15 * 60 + 1)).await;
        settle().await;
        assert_eq!(provider.fetch_count(), 6);
        assert!(sync.is_cycle_in_flight());

        gate.add_permits(1);
        assert!(matches!(manual.await.unwrap(), SyncOutcome::Completed(_)));
        assert_eq!(provider.fetch_count(), 6);

        // Later ticks are unaffected
        provider.set_gate(None);
        tokio::time::sleep(Duration::from_secs(15 * 60)).await;
        settle().await;
        assert_eq!(provider.fetch_count(), 9);
        sync.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_handshake_disconnects_without_timer() {
        let provider = healthy_provider();
        let auth_gate = Arc::new(Semaphore::new(0));
        provider.set_auth_gate(Some(auth_gate.clone()));
        let sync = Arc::new(coordinator(provider.clone()));

        let starting = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.start().await }
        });
        while !provider
            .calls()
            .iter()
            .any(|c| matches!(c, ProviderCall::Authorize(_)))
        {
            tokio::task::yield_now().await;
        }
        assert_eq!(sync.state(), CoordinatorState::Authorizing);

        let stopping = tokio::spawn({
            let sync = Arc::clone(&sync);
            async move { sync.stop().await }
        });
        while sync.state() != CoordinatorState::Stopped {
            tokio::task::yield_now().await;
        }
        auth_gate.add_permits(1);

        let status = starting.await.unwrap().unwrap();
        stopping.await.unwrap();

        assert_eq!(status.state, CoordinatorState::Stopped);
        assert_eq!(sync.status().authorization, AuthorizationState::Unauthorized);
        let disconnects = provider
            .calls()
            .into_iter()
            .filter(|c| *c == ProviderCall::Disconnect)
            .count();
        assert_eq!(disconnects, 1);
        assert_eq!(provider.fetch_count(), 0);

        // No timer was armed
        tokio::time::sleep(Duration::from_secs(60 * 60)).await;
        settle().await;
        assert_eq!(provider.fetch_count(), 0);
        assert!(sync.last_report().is_none());
    }

    #[tokio::test]
    async fn test_stop_disconnects_and_blocks_sync() {
        let provider = healthy_provider();
        let sync = coordinator(provider.clone());
        sync.start().await.unwrap();
        let before = sync.snapshot();

        sync.stop().await;
        sync.stop().await;

        let status = sync.status();
        assert_eq!(status.state, CoordinatorState::Stopped);
        assert_eq!(status.authorization, AuthorizationState::Unauthorized);
        assert_eq!(
            sync.sync_now().await,
            SyncOutcome::Skipped(SkipReason::Stopped)
        );
        assert_eq!(sync.snapshot(), before);
        let disconnects = provider
            .calls()
            .into_iter()
            .filter(|c| *c == ProviderCall::Disconnect)
            .count();
        assert_eq!(disconnects, 1);
    }

    #[tokio::test]
    async fn test_cycle_guard_releases_flag() {
        let flag = AtomicBool::new(false);
        {
            let _guard = CycleGuard::acquire(&flag).unwrap();
            assert!(CycleGuard::acquire(&flag).is_none());
        }
        assert!(CycleGuard::acquire(&flag).is_some());
    }
}

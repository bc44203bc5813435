//! Scripted provider for tests
//!
//! Every response can be set up front or changed between cycles, every call is
//! recorded, and fetches or the authorization handshake can be held open on a
//! semaphore to observe in-flight behavior.

use crate::error::ProviderError;
use crate::types::{Bucketing, MetricKind, Scope, SourceSamples, TimeWindow};
use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Semaphore;

use super::{AuthResult, FitnessProvider, Permission};

/// A call the scripted provider received
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    RequestPermission(Permission),
    Authorize(BTreeSet<Scope>),
    GetSamples {
        kind: MetricKind,
        window: TimeWindow,
        bucketing: Option<Bucketing>,
    },
    Disconnect,
}

#[derive(Debug)]
struct Script {
    permission: Result<bool, ProviderError>,
    authorization: Result<AuthResult, ProviderError>,
    responses: HashMap<MetricKind, Result<Vec<SourceSamples>, ProviderError>>,
    latency: Option<Duration>,
    gate: Option<Arc<Semaphore>>,
    auth_gate: Option<Arc<Semaphore>>,
}

/// Programmable fake provider
#[derive(Debug)]
pub struct ScriptedProvider {
    script: Mutex<Script>,
    calls: Mutex<Vec<ProviderCall>>,
}

impl Default for ScriptedProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedProvider {
    /// Grants permission, authorizes, and returns no sources for every metric
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                permission: Ok(true),
                authorization: Ok(AuthResult::granted()),
                responses: HashMap::new(),
                latency: None,
                gate: None,
                auth_gate: None,
            }),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_permission(self, permission: Result<bool, ProviderError>) -> Self {
        lock(&self.script).permission = permission;
        self
    }

    pub fn with_authorization(self, authorization: Result<AuthResult, ProviderError>) -> Self {
        lock(&self.script).authorization = authorization;
        self
    }

    pub fn with_sources(self, kind: MetricKind, sources: Vec<SourceSamples>) -> Self {
        self.set_sources(kind, sources);
        self
    }

    pub fn with_failure(self, kind: MetricKind, error: ProviderError) -> Self {
        self.set_failure(kind, error);
        self
    }

    pub fn set_sources(&self, kind: MetricKind, sources: Vec<SourceSamples>) {
        lock(&self.script).responses.insert(kind, Ok(sources));
    }

    pub fn set_failure(&self, kind: MetricKind, error: ProviderError) {
        lock(&self.script).responses.insert(kind, Err(error));
    }

    /// Delay every fetch by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        lock(&self.script).latency = latency;
    }

    /// Hold every fetch until a permit is available on `gate`
    pub fn set_gate(&self, gate: Option<Arc<Semaphore>>) {
        lock(&self.script).gate = gate;
    }

    /// Hold every authorization handshake until a permit is available on `gate`
    pub fn set_auth_gate(&self, gate: Option<Arc<Semaphore>>) {
        lock(&self.script).auth_gate = gate;
    }

    /// Every call received so far, in order
    pub fn calls(&self) -> Vec<ProviderCall> {
        lock(&self.calls).clone()
    }

    /// Number of `get_samples` calls received so far
    pub fn fetch_count(&self) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, ProviderCall::GetSamples { .. }))
            .count()
    }

    /// Number of `get_samples` calls received for `kind`
    pub fn fetch_count_for(&self, kind: MetricKind) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| matches!(c, ProviderCall::GetSamples { kind: k, .. } if *k == kind))
            .count()
    }

    fn record(&self, call: ProviderCall) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl FitnessProvider for ScriptedProvider {
    async fn request_permission(&self, permission: Permission) -> Result<bool, ProviderError> {
        self.record(ProviderCall::RequestPermission(permission));
        lock(&self.script).permission.clone()
    }

    async fn authorize(&self, scopes: &BTreeSet<Scope>) -> Result<AuthResult, ProviderError> {
        self.record(ProviderCall::Authorize(scopes.clone()));

        let gate = lock(&self.script).auth_gate.clone();
        pass(gate).await?;

        lock(&self.script).authorization.clone()
    }

    async fn get_samples(
        &self,
        kind: MetricKind,
        window: &TimeWindow,
        bucketing: Option<Bucketing>,
    ) -> Result<Vec<SourceSamples>, ProviderError> {
        self.record(ProviderCall::GetSamples {
            kind,
            window: *window,
            bucketing,
        });

        let (latency, gate) = {
            let script = lock(&self.script);
            (script.latency, script.gate.clone())
        };
        pass(gate).await?;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        lock(&self.script)
            .responses
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn disconnect(&self) {
        self.record(ProviderCall::Disconnect);
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Wait for a permit on `gate`, if any; the permit is returned immediately
async fn pass(gate: Option<Arc<Semaphore>>) -> Result<(), ProviderError> {
    if let Some(gate) = gate {
        let _permit = gate
            .acquire()
            .await
            .map_err(|_| ProviderError::Unavailable("gate closed".to_string()))?;
    }
    Ok(())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

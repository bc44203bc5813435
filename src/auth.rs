//! Provider authorization session
//!
//! Owns the `AuthorizationState`. The state becomes `Authorized` only after a
//! successful handshake and returns to `Unauthorized` only on `disconnect`.

use crate::error::AuthError;
use crate::provider::FitnessProvider;
use crate::types::{AuthorizationState, Scope};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

pub struct AuthSession {
    provider: Arc<dyn FitnessProvider>,
    authorized: AtomicBool,
    // Serializes handshakes and disconnects against each other
    handshake: Mutex<()>,
}

impl AuthSession {
    pub fn new(provider: Arc<dyn FitnessProvider>) -> Self {
        Self {
            provider,
            authorized: AtomicBool::new(false),
            handshake: Mutex::new(()),
        }
    }

    pub fn state(&self) -> AuthorizationState {
        if self.authorized.load(Ordering::SeqCst) {
            AuthorizationState::Authorized
        } else {
            AuthorizationState::Unauthorized
        }
    }

    pub fn is_authorized(&self) -> bool {
        self.state() == AuthorizationState::Authorized
    }

    /// Perform the authorization handshake for `scopes`.
    ///
    /// Permission must already be granted. Succeeds without contacting the
    /// provider when already authorized.
    pub async fn authorize(&self, scopes: &BTreeSet<Scope>) -> Result<(), AuthError> {
        let _handshake = self.handshake.lock().await;
        if self.is_authorized() {
            return Ok(());
        }

        let result = match self.provider.authorize(scopes).await {
            Ok(result) => result,
            Err(e) => {
                warn!("{} authorization error: {}", self.provider.name(), e);
                return Err(AuthError::Provider(e));
            }
        };

        if !result.success {
            let message = result
                .message
                .unwrap_or_else(|| "authorization denied".to_string());
            warn!("{} authorization denied: {}", self.provider.name(), message);
            return Err(AuthError::Denied { message });
        }

        self.authorized.store(true, Ordering::SeqCst);
        info!(
            "{} authorization successful ({} scopes)",
            self.provider.name(),
            scopes.len()
        );
        Ok(())
    }

    /// Release the provider session. No-op when never authorized.
    pub async fn disconnect(&self) {
        let _handshake = self.handshake.lock().await;
        if !self.authorized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.provider.disconnect().await;
        info!("Disconnected from {}", self.provider.name());
    }
}

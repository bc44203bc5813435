//! Activity permission gate

use crate::provider::{FitnessProvider, Permission};
use std::sync::Arc;
use tracing::{info, warn};

/// Wraps the platform permission prompt.
///
/// Any denial, dismissal or platform error collapses to `false`; nothing is
/// retried.
pub struct PermissionGate {
    provider: Arc<dyn FitnessProvider>,
}

impl PermissionGate {
    pub fn new(provider: Arc<dyn FitnessProvider>) -> Self {
        Self { provider }
    }

    /// Prompt for activity recognition; `true` only on explicit grant
    pub async fn request_activity_permission(&self) -> bool {
        match self
            .provider
            .request_permission(Permission::ActivityRecognition)
            .await
        {
            Ok(true) => {
                info!("Activity permission granted");
                true
            }
            Ok(false) => {
                warn!("Activity permission denied");
                false
            }
            Err(e) => {
                warn!("Activity permission request failed: {}", e);
                false
            }
        }
    }
}

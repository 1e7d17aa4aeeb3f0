//! # Authorization Gate
//!
//! Asks the host for media-library and location access and applies the
//! consequences of a refusal.
//!
//! ## Refusals
//!
//! A refusal is not an error. It is persisted as a cleared feature flag, which
//! the settings UI reflects:
//!
//! | Permission     | Flag cleared             | Wake trigger |
//! |----------------|--------------------------|--------------|
//! | Media library  | `auto_upload`            | stopped      |
//! | Location       | `auto_upload_background` | stopped      |
//!
//! The gate checks the current status before prompting, so an earlier refusal
//! answers `Denied` immediately without showing a prompt again.
//!
//! Requests may wait on the user for an unbounded time. Dropping the returned
//! future abandons the wait; nothing is left subscribed.

use crate::account::{AccountId, AccountStore, AutoUploadFlag};
use crate::wake_trigger::WakeTrigger;
use bridge_traits::{AuthorizationStatus, PermissionChange, PermissionKind, PermissionProvider};
use core_runtime::events::{CoreEvent, EventBus, PermissionEvent};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Answer of the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Authorization {
    Granted,
    Denied,
}

impl Authorization {
    pub fn is_granted(&self) -> bool {
        matches!(self, Authorization::Granted)
    }
}

pub struct AuthorizationGate {
    permissions: Arc<dyn PermissionProvider>,
    accounts: Arc<dyn AccountStore>,
    wake: Arc<WakeTrigger>,
    event_bus: Arc<EventBus>,
}

impl AuthorizationGate {
    pub fn new(
        permissions: Arc<dyn PermissionProvider>,
        accounts: Arc<dyn AccountStore>,
        wake: Arc<WakeTrigger>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            permissions,
            accounts,
            wake,
            event_bus,
        }
    }

    /// On refusal, clears `auto_upload` for the account and stops the wake trigger.
    pub async fn request_media_library_access(&self, account_id: &AccountId) -> Authorization {
        self.request(PermissionKind::MediaLibrary, account_id).await
    }

    /// On refusal, clears `auto_upload_background` and stops the wake trigger.
    pub async fn request_location_access(&self, account_id: &AccountId) -> Authorization {
        self.request(PermissionKind::Location, account_id).await
    }

    /// Apply a grant change reported by the host after the fact.
    ///
    /// Only refusals have an effect; they are applied to the active account.
    #[instrument(skip(self), fields(permission = %change.kind))]
    pub async fn handle_permission_change(&self, change: PermissionChange) {
        if !change.status.is_refused() {
            debug!(status = ?change.status, "Permission change needs no action");
            return;
        }

        info!("Permission revoked outside the app");
        self.event_bus
            .emit(CoreEvent::Permission(PermissionEvent::Revoked {
                permission: change.kind,
            }))
            .ok();

        let active = match self.accounts.active_account().await {
            Ok(active) => active,
            Err(e) => {
                warn!(error = %e, "Could not load active account");
                None
            }
        };

        match active {
            Some(account) => self.apply_refusal(change.kind, &account.id).await,
            None => self.wake.stop(&refusal_reason(change.kind)).await,
        }
    }

    #[instrument(skip(self), fields(account_id = %account_id))]
    async fn request(&self, kind: PermissionKind, account_id: &AccountId) -> Authorization {
        let status = match self.permissions.authorization_status(kind).await {
            Ok(AuthorizationStatus::NotDetermined) => {
                debug!("Prompting for {}", kind);
                self.permissions.request_authorization(kind).await
            }
            other => other,
        };

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                // Not a refusal: leave the flags alone and retry next cycle.
                warn!(error = %e, "Permission query failed");
                return Authorization::Denied;
            }
        };

        if status.is_granted() {
            return Authorization::Granted;
        }

        if status.is_refused() {
            info!(status = ?status, "{} access refused", kind);
            self.event_bus
                .emit(CoreEvent::Permission(PermissionEvent::Denied {
                    account_id: account_id.to_string(),
                    permission: kind,
                }))
                .ok();
            self.apply_refusal(kind, account_id).await;
        } else {
            debug!(status = ?status, "Permission still undetermined");
        }

        Authorization::Denied
    }

    async fn apply_refusal(&self, kind: PermissionKind, account_id: &AccountId) {
        self.wake.stop(&refusal_reason(kind)).await;

        let flag = match kind {
            PermissionKind::MediaLibrary => AutoUploadFlag::AutoUpload,
            PermissionKind::Location => AutoUploadFlag::AutoUploadBackground,
        };

        let account = match self.accounts.find(account_id).await {
            Ok(Some(account)) => account,
            Ok(None) => {
                warn!(account_id = %account_id, "Refusal for unknown account");
                return;
            }
            Err(e) => {
                warn!(account_id = %account_id, error = %e, "Could not load account");
                return;
            }
        };

        if !account.flag(flag) {
            return;
        }

        if let Err(e) = self.accounts.set_flag(account_id, flag, false).await {
            warn!(account_id = %account_id, flag = %flag, error = %e, "Failed to clear flag");
            return;
        }

        info!(account_id = %account_id, flag = %flag, "Feature disabled after refusal");
        self.event_bus
            .emit(CoreEvent::Permission(PermissionEvent::FeatureDisabled {
                account_id: account_id.to_string(),
                flag: flag.to_string(),
            }))
            .ok();
    }
}

fn refusal_reason(kind: PermissionKind) -> String {
    format!("{} access refused", kind)
}

//! Desktop Permission Provider

use async_trait::async_trait;
use bridge_traits::{
    error::Result,
    permissions::{
        AuthorizationStatus, PermissionChange, PermissionChangeStream, PermissionKind,
        PermissionProvider,
    },
};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

const CHANGE_BUFFER: usize = 16;

/// Permission provider with host-programmable grants.
///
/// Desktop operating systems do not gate photo folders or location behind
/// runtime prompts the way mobile platforms do. Every permission starts out
/// granted; a host (or a test) can change a grant with
/// [`set_status`](DesktopPermissionProvider::set_status), which is reported to
/// subscribers the same way a change in system settings would be.
///
/// Requests made while a permission is `NotDetermined` resolve to the
/// configured prompt answer, mimicking a user responding to a dialog.
pub struct DesktopPermissionProvider {
    statuses: RwLock<HashMap<PermissionKind, AuthorizationStatus>>,
    prompt_answer: AuthorizationStatus,
    changes: broadcast::Sender<PermissionChange>,
}

impl DesktopPermissionProvider {
    /// All permissions granted.
    pub fn new() -> Self {
        Self::with_statuses(AuthorizationStatus::Granted, AuthorizationStatus::Granted)
    }

    pub fn with_statuses(media_library: AuthorizationStatus, location: AuthorizationStatus) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUFFER);
        let statuses = HashMap::from([
            (PermissionKind::MediaLibrary, media_library),
            (PermissionKind::Location, location),
        ]);

        Self {
            statuses: RwLock::new(statuses),
            prompt_answer: AuthorizationStatus::Granted,
            changes,
        }
    }

    /// Status a `NotDetermined` permission moves to when requested.
    pub fn with_prompt_answer(mut self, answer: AuthorizationStatus) -> Self {
        self.prompt_answer = answer;
        self
    }

    /// Change a grant and notify subscribers.
    pub fn set_status(&self, kind: PermissionKind, status: AuthorizationStatus) {
        let previous = self.store(kind, status);
        if previous == Some(status) {
            return;
        }

        debug!(permission = %kind, ?status, "Desktop permission changed");
        // No subscribers is fine
        let _ = self.changes.send(PermissionChange { kind, status });
    }

    fn current(&self, kind: PermissionKind) -> AuthorizationStatus {
        match self.statuses.read() {
            Ok(statuses) => statuses
                .get(&kind)
                .copied()
                .unwrap_or(AuthorizationStatus::NotDetermined),
            Err(poisoned) => poisoned
                .into_inner()
                .get(&kind)
                .copied()
                .unwrap_or(AuthorizationStatus::NotDetermined),
        }
    }

    fn store(&self, kind: PermissionKind, status: AuthorizationStatus) -> Option<AuthorizationStatus> {
        match self.statuses.write() {
            Ok(mut statuses) => statuses.insert(kind, status),
            Err(poisoned) => {
                warn!("Permission table lock was poisoned; recovering");
                poisoned.into_inner().insert(kind, status)
            }
        }
    }
}

impl Default for DesktopPermissionProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PermissionProvider for DesktopPermissionProvider {
    async fn authorization_status(&self, kind: PermissionKind) -> Result<AuthorizationStatus> {
        Ok(self.current(kind))
    }

    async fn request_authorization(&self, kind: PermissionKind) -> Result<AuthorizationStatus> {
        let status = self.current(kind);
        if status != AuthorizationStatus::NotDetermined {
            return Ok(status);
        }

        self.store(kind, self.prompt_answer);
        debug!(permission = %kind, answer = ?self.prompt_answer, "Desktop permission prompt answered");
        Ok(self.prompt_answer)
    }

    async fn subscribe_changes(&self) -> Result<Box<dyn PermissionChangeStream>> {
        Ok(Box::new(DesktopPermissionChangeStream {
            receiver: self.changes.subscribe(),
        }))
    }
}

struct DesktopPermissionChangeStream {
    receiver: broadcast::Receiver<PermissionChange>,
}

#[async_trait]
impl PermissionChangeStream for DesktopPermissionChangeStream {
    async fn next(&mut self) -> Option<PermissionChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Permission change subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_everything_granted_by_default() {
        let provider = DesktopPermissionProvider::new();

        for kind in [PermissionKind::MediaLibrary, PermissionKind::Location] {
            assert_eq!(
                provider.authorization_status(kind).await.unwrap(),
                AuthorizationStatus::Granted
            );
        }
    }

    #[tokio::test]
    async fn test_request_resolves_undetermined_with_prompt_answer() {
        let provider = DesktopPermissionProvider::with_statuses(
            AuthorizationStatus::NotDetermined,
            AuthorizationStatus::NotDetermined,
        )
        .with_prompt_answer(AuthorizationStatus::Denied);

        let answer = provider
            .request_authorization(PermissionKind::Location)
            .await
            .unwrap();
        assert_eq!(answer, AuthorizationStatus::Denied);
        assert_eq!(
            provider
                .authorization_status(PermissionKind::Location)
                .await
                .unwrap(),
            AuthorizationStatus::Denied
        );
    }

    #[tokio::test]
    async fn test_refused_permission_is_not_prompted_again() {
        let provider = DesktopPermissionProvider::with_statuses(
            AuthorizationStatus::Restricted,
            AuthorizationStatus::Granted,
        );

        let answer = provider
            .request_authorization(PermissionKind::MediaLibrary)
            .await
            .unwrap();
        assert_eq!(answer, AuthorizationStatus::Restricted);
    }

    #[tokio::test]
    async fn test_set_status_notifies_subscribers() {
        let provider = DesktopPermissionProvider::new();
        let mut changes = provider.subscribe_changes().await.unwrap();

        provider.set_status(PermissionKind::Location, AuthorizationStatus::Granted);
        provider.set_status(PermissionKind::Location, AuthorizationStatus::Denied);

        // Setting an unchanged status is not reported
        let change = changes.next().await.unwrap();
        assert_eq!(change.kind, PermissionKind::Location);
        assert_eq!(change.status, AuthorizationStatus::Denied);
    }
}

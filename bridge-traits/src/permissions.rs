//! Permission Abstraction
//!
//! Exposes the two OS grants the auto-upload engine depends on: access to the
//! photo library and access to location services.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

/// Permission the engine needs from the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionKind {
    /// Read access to the device media library
    MediaLibrary,
    /// "Always" location access, needed for background wake-ups
    Location,
}

impl PermissionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionKind::MediaLibrary => "media_library",
            PermissionKind::Location => "location",
        }
    }
}

impl fmt::Display for PermissionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization state as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    /// The user has not been asked yet
    NotDetermined,
    /// Access granted
    Granted,
    /// The user refused access
    Denied,
    /// Access blocked by policy (parental controls, MDM)
    Restricted,
}

impl AuthorizationStatus {
    pub fn is_granted(&self) -> bool {
        matches!(self, AuthorizationStatus::Granted)
    }

    /// Denied and restricted states cannot be changed by prompting again.
    pub fn is_refused(&self) -> bool {
        matches!(
            self,
            AuthorizationStatus::Denied | AuthorizationStatus::Restricted
        )
    }
}

/// A change in authorization reported by the host after the fact
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermissionChange {
    pub kind: PermissionKind,
    pub status: AuthorizationStatus,
}

/// Permission provider trait
///
/// # Ask-once semantics
///
/// Operating systems only show each permission prompt once. After a refusal
/// the user must change the grant in system settings. Callers should therefore
/// check [`authorization_status`](PermissionProvider::authorization_status)
/// first and only call
/// [`request_authorization`](PermissionProvider::request_authorization) while
/// the status is [`AuthorizationStatus::NotDetermined`].
///
/// # Platform Support
///
/// - **iOS**: `PHPhotoLibrary.requestAuthorization`, `CLLocationManager.requestAlwaysAuthorization`
/// - **Android**: runtime permissions (`READ_MEDIA_IMAGES`, `ACCESS_BACKGROUND_LOCATION`)
/// - **Desktop**: no prompts, grants are configured by the host
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Current status without prompting the user.
    async fn authorization_status(&self, kind: PermissionKind) -> Result<AuthorizationStatus>;

    /// Prompt the user if needed and resolve once they answer.
    ///
    /// This may take an indeterminate amount of wall-clock time. Dropping the
    /// returned future abandons the wait.
    async fn request_authorization(&self, kind: PermissionKind) -> Result<AuthorizationStatus>;

    /// Subscribe to grant changes made outside the app (system settings).
    async fn subscribe_changes(&self) -> Result<Box<dyn PermissionChangeStream>>;
}

/// Stream of permission changes
#[async_trait]
pub trait PermissionChangeStream: Send {
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<PermissionChange>;
}

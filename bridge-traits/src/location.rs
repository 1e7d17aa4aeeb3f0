//! Significant Location Change Monitoring
//!
//! Low-power location subscription used as a wake signal. The engine does not
//! care where the device is; it only uses the fact that the OS resumed the
//! process to deliver an update.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{error::Result, permissions::AuthorizationStatus};

/// A single location fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
}

/// Callback delivered by the location subsystem
#[derive(Debug, Clone, PartialEq)]
pub enum LocationEvent {
    /// The device moved significantly. Carries the most recent fix.
    Updated(LocationFix),
    /// Location authorization changed while monitoring
    AuthorizationChanged(AuthorizationStatus),
    /// Monitoring failed and will not deliver further updates
    Failed(String),
}

/// Location monitor trait
///
/// # Platform Support
///
/// - **iOS**: `CLLocationManager.startMonitoringSignificantLocationChanges`
/// - **Android**: fused location provider with a large displacement threshold
/// - **Desktop**: no movement, never emits
#[async_trait]
pub trait LocationMonitor: Send + Sync {
    /// Begin monitoring and return the stream of callbacks.
    ///
    /// Only one subscription is active at a time; starting again replaces the
    /// previous stream.
    async fn start_significant_change_updates(&self) -> Result<Box<dyn LocationEventStream>>;

    /// Stop monitoring. Stopping an idle monitor is a no-op.
    async fn stop_significant_change_updates(&self) -> Result<()>;
}

/// Stream of location callbacks
#[async_trait]
pub trait LocationEventStream: Send {
    /// Returns `None` when monitoring ended.
    async fn next(&mut self) -> Option<LocationEvent>;
}

//! App Lifecycle
//!
//! Lets the core know whether the host process is in the foreground or is
//! running on borrowed background time.

use async_trait::async_trait;

use crate::error::Result;

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Application is in the foreground and active
    Foreground,
    /// Application is executing in the background
    Background,
    /// Application is suspended and will not execute until resumed
    Suspended,
}

impl LifecycleState {
    /// Whether the process is running without a visible UI.
    pub fn is_backgrounded(&self) -> bool {
        matches!(self, LifecycleState::Background)
    }
}

/// Lifecycle observer trait
///
/// The wake trigger consults the current state before scanning: location
/// updates only start a scan while the process is backgrounded, because a
/// foreground app is already scanned on activation.
///
/// # Platform Support
///
/// - **iOS**: `UIApplication.applicationState` and lifecycle notifications
/// - **Android**: `ProcessLifecycleOwner`
/// - **Desktop**: always foreground
#[async_trait]
pub trait LifecycleObserver: Send + Sync {
    /// Get current lifecycle state
    async fn get_state(&self) -> Result<LifecycleState>;

    /// Subscribe to lifecycle state changes
    async fn subscribe_changes(&self) -> Result<Box<dyn LifecycleChangeStream>>;
}

/// Stream of lifecycle state changes
#[async_trait]
pub trait LifecycleChangeStream: Send {
    /// Get the next lifecycle state update
    ///
    /// Returns `None` when the stream is closed.
    async fn next(&mut self) -> Option<LifecycleState>;
}

//! # Event Bus System
//!
//! Typed notifications from the auto-upload engine, delivered over a
//! `tokio::sync::broadcast` channel.
//!
//! ## Overview
//!
//! The engine never surfaces permission refusals or sync results as errors to
//! its callers. Instead it updates persisted account flags and publishes events
//! here, so UI layers can reflect the new state:
//!
//! - **AutoUpload**: sync runs starting, finishing, being coalesced, rejected batches
//! - **Permission**: denials, revocations detected after the fact, disabled feature flags
//! - **WakeTrigger**: location monitoring starting and stopping, background wake-ups
//!
//! ```text
//! ┌──────────────────┐   emit   ┌───────────┐  subscribe  ┌────────────┐
//! │ AuthorizationGate├─────────>│           ├────────────>│ Settings UI│
//! ├──────────────────┤          │ EventBus  │             └────────────┘
//! │ WakeTrigger      ├─────────>│ (broadcast│  subscribe  ┌────────────┐
//! ├──────────────────┤          │  channel) ├────────────>│ Diagnostics│
//! │ Coordinator      ├─────────>│           │             └────────────┘
//! └──────────────────┘          └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{AutoUploadEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(100);
//! let mut stream = event_bus.subscribe();
//!
//! event_bus
//!     .emit(CoreEvent::AutoUpload(AutoUploadEvent::Coalesced {
//!         account_id: "alice".to_string(),
//!     }))
//!     .ok();
//!
//! let event = stream.recv().await.unwrap();
//! assert_eq!(event.description(), "Sync request coalesced with a running sync");
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `emit` fails only when nobody is subscribed. Publishers ignore that error:
//! a missing listener never fails a sync cycle. Slow subscribers receive
//! `RecvError::Lagged(n)` and continue from the oldest retained event.

use bridge_traits::PermissionKind;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{
    self,
    error::{RecvError, SendError},
    Receiver,
};

/// Default number of events buffered per subscriber
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Top-level event published by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    AutoUpload(AutoUploadEvent),
    Permission(PermissionEvent),
    WakeTrigger(WakeTriggerEvent),
}

impl CoreEvent {
    /// Short human-readable description.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::AutoUpload(e) => e.description(),
            CoreEvent::Permission(e) => e.description(),
            CoreEvent::WakeTrigger(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::AutoUpload(AutoUploadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::AutoUpload(AutoUploadEvent::EnqueueRejected { .. }) => {
                EventSeverity::Warning
            }
            CoreEvent::Permission(PermissionEvent::Denied { .. })
            | CoreEvent::Permission(PermissionEvent::Revoked { .. }) => EventSeverity::Warning,
            CoreEvent::Permission(PermissionEvent::FeatureDisabled { .. }) => EventSeverity::Info,
            CoreEvent::AutoUpload(AutoUploadEvent::Completed { .. })
            | CoreEvent::AutoUpload(AutoUploadEvent::IndexRealigned { .. }) => EventSeverity::Info,
            CoreEvent::WakeTrigger(WakeTriggerEvent::MonitoringStopped { .. }) => {
                EventSeverity::Info
            }
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Auto-upload Events
// ============================================================================

/// Progress of sync runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AutoUploadEvent {
    /// A sync run passed the permission gate and is scanning the catalog.
    Started {
        run_id: String,
        account_id: String,
        /// `incremental`, `full_realign` or `upload_all`
        mode: String,
    },
    /// A sync run handed its plan to the upload pipeline.
    Completed {
        run_id: String,
        account_id: String,
        /// Catalog assets matching the filter
        scanned: u64,
        /// Assets handed to the upload pipeline
        enqueued: u64,
    },
    /// A trigger arrived while a run for the same account was in flight and was dropped.
    Coalesced { account_id: String },
    /// The upload pipeline refused a batch. The assets stay recorded in the index.
    EnqueueRejected {
        run_id: String,
        account_id: String,
        count: u64,
        reason: String,
    },
    /// The run did nothing this cycle because of a storage or pipeline failure.
    Failed {
        run_id: String,
        account_id: String,
        message: String,
    },
    /// The dedup index was rebuilt from the current catalog.
    IndexRealigned {
        account_id: String,
        known_assets: u64,
    },
}

impl AutoUploadEvent {
    fn description(&self) -> &str {
        match self {
            AutoUploadEvent::Started { .. } => "Auto-upload sync started",
            AutoUploadEvent::Completed { .. } => "Auto-upload sync completed",
            AutoUploadEvent::Coalesced { .. } => "Sync request coalesced with a running sync",
            AutoUploadEvent::EnqueueRejected { .. } => "Upload pipeline rejected a batch",
            AutoUploadEvent::Failed { .. } => "Auto-upload sync failed",
            AutoUploadEvent::IndexRealigned { .. } => "Upload index realigned with the catalog",
        }
    }
}

// ============================================================================
// Permission Events
// ============================================================================

/// Permission outcomes that changed engine state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum PermissionEvent {
    /// A permission request resolved to denied (or was already refused).
    Denied {
        account_id: String,
        permission: PermissionKind,
    },
    /// The host reported a grant withdrawn outside the app.
    Revoked { permission: PermissionKind },
    /// A persisted account flag was cleared as a consequence.
    FeatureDisabled { account_id: String, flag: String },
}

impl PermissionEvent {
    fn description(&self) -> &str {
        match self {
            PermissionEvent::Denied { .. } => "Permission denied",
            PermissionEvent::Revoked { .. } => "Permission revoked",
            PermissionEvent::FeatureDisabled { .. } => "Auto-upload feature disabled",
        }
    }
}

// ============================================================================
// Wake Trigger Events
// ============================================================================

/// Significant-location wake trigger lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event")]
pub enum WakeTriggerEvent {
    MonitoringStarted { account_id: String },
    MonitoringStopped { reason: String },
    /// A location update arrived while backgrounded. Coordinates are coarse.
    Woke { latitude: f64, longitude: f64 },
}

impl WakeTriggerEvent {
    fn description(&self) -> &str {
        match self {
            WakeTriggerEvent::MonitoringStarted { .. } => "Background wake monitoring started",
            WakeTriggerEvent::MonitoringStopped { .. } => "Background wake monitoring stopped",
            WakeTriggerEvent::Woke { .. } => "Woken by a significant location change",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning the bus is cheap; all clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus buffering up to `capacity` events per subscriber.
    ///
    /// A subscriber that falls further behind receives `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an error
    /// when there are none.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::new(100);
/// let permissions_only = EventStream::new(event_bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Permission(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` once every sender is gone.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Non-blocking receive. Returns `None` if nothing matching is queued.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn completed(enqueued: u64) -> CoreEvent {
        CoreEvent::AutoUpload(AutoUploadEvent::Completed {
            run_id: "run-1".to_string(),
            account_id: "alice".to_string(),
            scanned: 10,
            enqueued,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);
        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(completed(1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::WakeTrigger(WakeTriggerEvent::MonitoringStarted {
            account_id: "alice".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::Permission(_)));

        bus.emit(completed(3)).ok();
        let revoked = CoreEvent::Permission(PermissionEvent::Revoked {
            permission: PermissionKind::Location,
        });
        bus.emit(revoked.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), revoked);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.emit(completed(i)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::AutoUpload(AutoUploadEvent::Failed {
            run_id: "run-1".to_string(),
            account_id: "alice".to_string(),
            message: "database is locked".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let denied = CoreEvent::Permission(PermissionEvent::Denied {
            account_id: "alice".to_string(),
            permission: PermissionKind::MediaLibrary,
        });
        assert_eq!(denied.severity(), EventSeverity::Warning);

        assert_eq!(completed(1).severity(), EventSeverity::Info);

        let woke = CoreEvent::WakeTrigger(WakeTriggerEvent::Woke {
            latitude: 45.46,
            longitude: 9.19,
        });
        assert_eq!(woke.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Permission(PermissionEvent::FeatureDisabled {
            account_id: "alice".to_string(),
            flag: "auto_upload_background".to_string(),
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Permission\""));
        assert!(json.contains("auto_upload_background"));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv_skips_filtered_events() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| event.severity() >= EventSeverity::Warning);

        assert!(stream.try_recv().is_none());

        bus.emit(completed(2)).ok();
        assert!(stream.try_recv().is_none());

        let rejected = CoreEvent::AutoUpload(AutoUploadEvent::EnqueueRejected {
            run_id: "run-1".to_string(),
            account_id: "alice".to_string(),
            count: 4,
            reason: "quota exceeded".to_string(),
        });
        bus.emit(rejected.clone()).ok();
        assert_eq!(stream.try_recv().unwrap().unwrap(), rejected);
    }
}

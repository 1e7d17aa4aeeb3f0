//! # Wake Trigger
//!
//! Significant-location-change monitoring used to wake the process for a
//! background upload cycle.
//!
//! ## State Machine
//!
//! ```text
//! Stopped ──start()──> Monitoring ──stop() / revocation / failure──> Stopped
//! ```
//!
//! Monitoring starts only when the feature is enabled, the account has both
//! `auto_upload` and `auto_upload_background` set, and location access is
//! granted. Each location update received while the process is backgrounded
//! invokes the [`WakeHandler`] once. A revoked location grant or a monitoring
//! failure stops the trigger and clears `auto_upload_background`.
//!
//! Location updates are delivered on a monitor task, never on the caller.

use crate::account::{Account, AccountId, AccountStore, AutoUploadFlag};
use async_trait::async_trait;
use bridge_traits::{
    LifecycleObserver, LocationEvent, LocationEventStream, LocationFix, LocationMonitor,
};
use core_runtime::events::{CoreEvent, EventBus, PermissionEvent, WakeTriggerEvent};
use core_runtime::logging::coarse_coordinate;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Receives background wake-ups
#[async_trait]
pub trait WakeHandler: Send + Sync {
    async fn on_wake(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeTriggerState {
    Stopped,
    Monitoring,
}

struct ActiveMonitor {
    account_id: AccountId,
    cancellation: CancellationToken,
    /// Distinguishes this monitor from later ones started after a stop
    generation: u64,
}

struct Inner {
    location: Arc<dyn LocationMonitor>,
    lifecycle: Arc<dyn LifecycleObserver>,
    accounts: Arc<dyn AccountStore>,
    event_bus: Arc<EventBus>,
    enabled: bool,
    monitor: Mutex<Option<ActiveMonitor>>,
    generation: AtomicU64,
}

pub struct WakeTrigger {
    inner: Arc<Inner>,
}

impl WakeTrigger {
    /// `enabled` mirrors `FeatureFlags::enable_background_wake`; a disabled
    /// trigger never leaves `Stopped`.
    pub fn new(
        location: Arc<dyn LocationMonitor>,
        lifecycle: Arc<dyn LifecycleObserver>,
        accounts: Arc<dyn AccountStore>,
        event_bus: Arc<EventBus>,
        enabled: bool,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                location,
                lifecycle,
                accounts,
                event_bus,
                enabled,
                monitor: Mutex::new(None),
                generation: AtomicU64::new(0),
            }),
        }
    }

    pub async fn state(&self) -> WakeTriggerState {
        if self.inner.monitor.lock().await.is_some() {
            WakeTriggerState::Monitoring
        } else {
            WakeTriggerState::Stopped
        }
    }

    /// Account the trigger is monitoring for, if any.
    pub async fn monitored_account(&self) -> Option<AccountId> {
        self.inner
            .monitor
            .lock()
            .await
            .as_ref()
            .map(|monitor| monitor.account_id.clone())
    }

    /// Begin monitoring for `account`. No-op while already monitoring.
    ///
    /// Returns the resulting state. A monitor that fails to start clears the
    /// account's background flag.
    pub async fn start(
        &self,
        account: &Account,
        location_granted: bool,
        handler: Arc<dyn WakeHandler>,
    ) -> WakeTriggerState {
        let mut monitor = self.inner.monitor.lock().await;

        if monitor.is_some() {
            return WakeTriggerState::Monitoring;
        }

        if !self.inner.enabled {
            debug!("Background wake disabled by configuration");
            return WakeTriggerState::Stopped;
        }

        if !account.wants_background_upload() || !location_granted {
            debug!(
                account_id = %account.id,
                location_granted,
                "Background upload not requested or not permitted"
            );
            return WakeTriggerState::Stopped;
        }

        let stream = match self.inner.location.start_significant_change_updates().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(account_id = %account.id, error = %e, "Failed to start location monitoring");
                drop(monitor);
                self.inner.disable_background(&account.id).await;
                return WakeTriggerState::Stopped;
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancellation = CancellationToken::new();

        *monitor = Some(ActiveMonitor {
            account_id: account.id.clone(),
            cancellation: cancellation.clone(),
            generation,
        });
        drop(monitor);

        self.inner
            .event_bus
            .emit(CoreEvent::WakeTrigger(WakeTriggerEvent::MonitoringStarted {
                account_id: account.id.to_string(),
            }))
            .ok();
        info!(account_id = %account.id, "Significant location monitoring started");

        let inner = Arc::clone(&self.inner);
        let account_id = account.id.clone();
        tokio::spawn(async move {
            inner
                .run_monitor(stream, cancellation, generation, account_id, handler)
                .await;
        });

        WakeTriggerState::Monitoring
    }

    /// Stop monitoring. Stopping a stopped trigger is a no-op.
    pub async fn stop(&self, reason: &str) {
        let active = self.inner.monitor.lock().await.take();

        match active {
            Some(active) => self.inner.shut_down(active, reason).await,
            None => debug!(reason, "Wake trigger already stopped"),
        }
    }
}

impl Inner {
    async fn run_monitor(
        &self,
        mut stream: Box<dyn LocationEventStream>,
        cancellation: CancellationToken,
        generation: u64,
        account_id: AccountId,
        handler: Arc<dyn WakeHandler>,
    ) {
        loop {
            let event = tokio::select! {
                _ = cancellation.cancelled() => break,
                event = stream.next() => event,
            };

            match event {
                Some(LocationEvent::Updated(fix)) => self.on_location_update(fix, &handler).await,
                Some(LocationEvent::AuthorizationChanged(status)) if status.is_refused() => {
                    info!(status = ?status, "Location access withdrawn while monitoring");
                    self.halt(generation, &account_id, "location access revoked", true)
                        .await;
                    break;
                }
                Some(LocationEvent::AuthorizationChanged(status)) => {
                    debug!(status = ?status, "Location authorization changed");
                }
                Some(LocationEvent::Failed(message)) => {
                    warn!(error = %message, "Location monitoring failed");
                    self.halt(generation, &account_id, "location monitoring failed", true)
                        .await;
                    break;
                }
                None => {
                    debug!("Location event stream closed");
                    self.halt(generation, &account_id, "location stream closed", false)
                        .await;
                    break;
                }
            }
        }
    }

    async fn on_location_update(&self, fix: LocationFix, handler: &Arc<dyn WakeHandler>) {
        let latitude = coarse_coordinate(fix.latitude);
        let longitude = coarse_coordinate(fix.longitude);
        info!(latitude, longitude, "Location update received");

        match self.lifecycle.get_state().await {
            Ok(state) if state.is_backgrounded() => {
                self.event_bus
                    .emit(CoreEvent::WakeTrigger(WakeTriggerEvent::Woke {
                        latitude,
                        longitude,
                    }))
                    .ok();

                let handler = Arc::clone(handler);
                tokio::spawn(async move { handler.on_wake().await });
            }
            Ok(state) => debug!(state = ?state, "Not backgrounded, ignoring location update"),
            Err(e) => warn!(error = %e, "Could not read lifecycle state, ignoring location update"),
        }
    }

    /// Stop the monitor started as `generation`, if it is still the current one.
    async fn halt(&self, generation: u64, account_id: &AccountId, reason: &str, clear_flag: bool) {
        let active = {
            let mut monitor = self.monitor.lock().await;
            let current = monitor
                .as_ref()
                .is_some_and(|active| active.generation == generation);
            if current {
                monitor.take()
            } else {
                None
            }
        };

        let Some(active) = active else {
            return;
        };

        self.shut_down(active, reason).await;
        if clear_flag {
            self.disable_background(account_id).await;
        }
    }

    async fn shut_down(&self, active: ActiveMonitor, reason: &str) {
        active.cancellation.cancel();

        if let Err(e) = self.location.stop_significant_change_updates().await {
            warn!(error = %e, "Failed to stop location monitoring");
        }

        self.event_bus
            .emit(CoreEvent::WakeTrigger(WakeTriggerEvent::MonitoringStopped {
                reason: reason.to_string(),
            }))
            .ok();
        info!(account_id = %active.account_id, reason, "Significant location monitoring stopped");
    }

    async fn disable_background(&self, account_id: &AccountId) {
        let flag = AutoUploadFlag::AutoUploadBackground;

        match self.accounts.set_flag(account_id, flag, false).await {
            Ok(()) => {
                self.event_bus
                    .emit(CoreEvent::Permission(PermissionEvent::FeatureDisabled {
                        account_id: account_id.to_string(),
                        flag: flag.to_string(),
                    }))
                    .ok();
            }
            Err(e) => warn!(account_id = %account_id, error = %e, "Failed to clear background upload flag"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::SqliteAccountStore;
    use crate::db::create_test_pool;
    use bridge_traits::background::LifecycleChangeStream;
    use bridge_traits::{
        error::Result as BridgeResult, AuthorizationStatus, BridgeError, LifecycleState,
    };
    use chrono::Utc;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::mpsc;

    /// Location monitor driven by the test through an mpsc channel
    struct ScriptedLocation {
        sender: std::sync::Mutex<Option<mpsc::UnboundedSender<LocationEvent>>>,
        fail_start: bool,
        stops: AtomicUsize,
    }

    impl ScriptedLocation {
        fn new(fail_start: bool) -> Self {
            Self {
                sender: std::sync::Mutex::new(None),
                fail_start,
                stops: AtomicUsize::new(0),
            }
        }

        fn send(&self, event: LocationEvent) {
            let sender = self.sender.lock().unwrap();
            sender.as_ref().unwrap().send(event).unwrap();
        }
    }

    struct ChannelStream(mpsc::UnboundedReceiver<LocationEvent>);

    #[async_trait]
    impl LocationEventStream for ChannelStream {
        async fn next(&mut self) -> Option<LocationEvent> {
            self.0.recv().await
        }
    }

    #[async_trait]
    impl LocationMonitor for ScriptedLocation {
        async fn start_significant_change_updates(&self) -> BridgeResult<Box<dyn LocationEventStream>> {
            if self.fail_start {
                return Err(BridgeError::Location("services disabled".to_string()));
            }
            let (tx, rx) = mpsc::unbounded_channel();
            *self.sender.lock().unwrap() = Some(tx);
            Ok(Box::new(ChannelStream(rx)))
        }

        async fn stop_significant_change_updates(&self) -> BridgeResult<()> {
            self.stops.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FixedLifecycle(LifecycleState);

    struct NoChanges;

    #[async_trait]
    impl LifecycleChangeStream for NoChanges {
        async fn next(&mut self) -> Option<LifecycleState> {
            std::future::pending().await
        }
    }

    #[async_trait]
    impl LifecycleObserver for FixedLifecycle {
        async fn get_state(&self) -> BridgeResult<LifecycleState> {
            Ok(self.0)
        }

        async fn subscribe_changes(&self) -> BridgeResult<Box<dyn LifecycleChangeStream>> {
            Ok(Box::new(NoChanges))
        }
    }

    #[derive(Default)]
    struct CountingHandler(AtomicUsize);

    #[async_trait]
    impl WakeHandler for CountingHandler {
        async fn on_wake(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct Fixture {
        trigger: WakeTrigger,
        location: Arc<ScriptedLocation>,
        accounts: Arc<SqliteAccountStore>,
        handler: Arc<CountingHandler>,
    }

    fn account() -> Account {
        Account::new("alice")
            .with_auto_upload(true)
            .with_background(true)
            .with_images(true)
    }

    async fn fixture(state: LifecycleState, fail_start: bool, enabled: bool) -> Fixture {
        let accounts = Arc::new(SqliteAccountStore::new(create_test_pool().await.unwrap()));
        accounts.upsert(&account()).await.unwrap();

        let location = Arc::new(ScriptedLocation::new(fail_start));
        let trigger = WakeTrigger::new(
            location.clone(),
            Arc::new(FixedLifecycle(state)),
            accounts.clone(),
            Arc::new(EventBus::default()),
            enabled,
        );

        Fixture {
            trigger,
            location,
            accounts,
            handler: Arc::new(CountingHandler::default()),
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    fn fix() -> LocationEvent {
        LocationEvent::Updated(LocationFix {
            latitude: 48.858_37,
            longitude: 2.294_48,
            timestamp: Utc::now(),
        })
    }

    #[tokio::test]
    async fn test_start_requires_flags_and_grant() {
        let f = fixture(LifecycleState::Background, false, true).await;

        let state = f.trigger.start(&account(), false, f.handler.clone()).await;
        assert_eq!(state, WakeTriggerState::Stopped);

        let foreground_only = account().with_background(false);
        let state = f.trigger.start(&foreground_only, true, f.handler.clone()).await;
        assert_eq!(state, WakeTriggerState::Stopped);

        let state = f.trigger.start(&account(), true, f.handler.clone()).await;
        assert_eq!(state, WakeTriggerState::Monitoring);
        assert_eq!(f.trigger.monitored_account().await, Some(account().id));
    }

    #[tokio::test]
    async fn test_disabled_trigger_never_starts() {
        let f = fixture(LifecycleState::Background, false, false).await;
        let state = f.trigger.start(&account(), true, f.handler.clone()).await;
        assert_eq!(state, WakeTriggerState::Stopped);
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let f = fixture(LifecycleState::Background, false, true).await;

        f.trigger.start(&account(), true, f.handler.clone()).await;
        f.trigger.start(&account(), true, f.handler.clone()).await;
        assert_eq!(f.trigger.state().await, WakeTriggerState::Monitoring);

        f.trigger.stop("test").await;
        f.trigger.stop("test").await;
        assert_eq!(f.trigger.state().await, WakeTriggerState::Stopped);
        assert_eq!(f.location.stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_in_background_wakes_handler() {
        let f = fixture(LifecycleState::Background, false, true).await;
        f.trigger.start(&account(), true, f.handler.clone()).await;

        f.location.send(fix());
        settle().await;

        assert_eq!(f.handler.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_in_foreground_is_ignored() {
        let f = fixture(LifecycleState::Foreground, false, true).await;
        f.trigger.start(&account(), true, f.handler.clone()).await;

        f.location.send(fix());
        settle().await;

        assert_eq!(f.handler.0.load(Ordering::SeqCst), 0);
        assert_eq!(f.trigger.state().await, WakeTriggerState::Monitoring);
    }

    #[tokio::test]
    async fn test_revocation_stops_and_clears_background_flag() {
        let f = fixture(LifecycleState::Background, false, true).await;
        f.trigger.start(&account(), true, f.handler.clone()).await;

        f.location
            .send(LocationEvent::AuthorizationChanged(AuthorizationStatus::Denied));
        settle().await;

        assert_eq!(f.trigger.state().await, WakeTriggerState::Stopped);
        let stored = f.accounts.find(&account().id).await.unwrap().unwrap();
        assert!(!stored.auto_upload_background);
        assert!(stored.auto_upload);
    }

    #[tokio::test]
    async fn test_monitoring_failure_clears_background_flag() {
        let f = fixture(LifecycleState::Background, false, true).await;
        f.trigger.start(&account(), true, f.handler.clone()).await;

        f.location.send(LocationEvent::Failed("kCLErrorDenied".to_string()));
        settle().await;

        assert_eq!(f.trigger.state().await, WakeTriggerState::Stopped);
        let stored = f.accounts.find(&account().id).await.unwrap().unwrap();
        assert!(!stored.auto_upload_background);
    }

    #[tokio::test]
    async fn test_start_failure_clears_background_flag() {
        let f = fixture(LifecycleState::Background, true, true).await;

        let state = f.trigger.start(&account(), true, f.handler.clone()).await;
        assert_eq!(state, WakeTriggerState::Stopped);

        let stored = f.accounts.find(&account().id).await.unwrap().unwrap();
        assert!(!stored.auto_upload_background);
    }

    #[tokio::test]
    async fn test_stop_ignores_later_events() {
        let f = fixture(LifecycleState::Background, false, true).await;
        f.trigger.start(&account(), true, f.handler.clone()).await;
        f.trigger.stop("user disabled background upload").await;

        // The stream receiver is gone once the monitor task exits.
        settle().await;
        let sender = f.location.sender.lock().unwrap().take().unwrap();
        assert!(sender.send(fix()).is_err());
        assert_eq!(f.handler.0.load(Ordering::SeqCst), 0);
    }
}

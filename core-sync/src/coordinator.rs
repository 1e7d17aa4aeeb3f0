//! # Auto-Upload Coordinator
//!
//! Composes the gate, planner, wake trigger and upload pipeline into the
//! engine's entry points.
//!
//! ## Entry Points
//!
//! - [`initiate_foreground_or_wake_sync`](AutoUploadCoordinator::initiate_foreground_or_wake_sync):
//!   incremental cycle for the active account, then start or stop the wake
//!   trigger according to the background setting and location access
//! - [`initiate_full_realign`](AutoUploadCoordinator::initiate_full_realign):
//!   rebuild the dedup index from the catalog and enqueue everything
//! - [`initiate_full_scan_ignoring_index`](AutoUploadCoordinator::initiate_full_scan_ignoring_index):
//!   enqueue everything without touching the index
//!
//! None of them fail. Each returns a [`SyncOutcome`]: what was planned, why
//! nothing ran, or that the request was coalesced into a run already in flight.
//!
//! ## Concurrency
//!
//! One run per account at a time. A trigger arriving while a run for the same
//! account is in flight is dropped, not queued.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::AutoUploadCoordinator;
//!
//! let coordinator = AutoUploadCoordinator::open(config).await?;
//! coordinator.start().await?;
//!
//! match coordinator.initiate_full_realign().await {
//!     SyncOutcome::Planned { enqueued, .. } => println!("{} assets queued", enqueued),
//!     other => println!("nothing uploaded: {:?}", other),
//! }
//! ```

use crate::account::{Account, AccountId, AccountStore, SqliteAccountStore};
use crate::asset::ScanMode;
use crate::authorization::AuthorizationGate;
use crate::db::{create_pool, DatabaseConfig};
use crate::dedup_index::{DedupIndex, SqliteDedupIndex};
use crate::planner::{SyncPlan, SyncPlanner};
use crate::scanner::AssetCatalogScanner;
use crate::wake_trigger::{WakeHandler, WakeTrigger, WakeTriggerState};
use crate::Result;
use async_trait::async_trait;
use bridge_traits::{
    EnqueueOutcome, LifecycleChangeStream, LifecycleObserver, LifecycleState, MediaAsset,
    PermissionChangeStream, PermissionProvider, UploadEnqueuer, UploadOrigin,
};
use core_runtime::config::AutoUploadConfig;
use core_runtime::events::{AutoUploadEvent, CoreEvent, EventBus};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of one sync run, carried by its events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncRunId(Uuid);

impl SyncRunId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SyncRunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SyncRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// What a run does with the dedup index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    /// New assets only, recorded in the index
    Incremental,
    /// Index rebuilt, every asset enqueued
    FullRealign,
    /// Every asset enqueued, index untouched
    UploadAll,
}

impl RunKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunKind::Incremental => "incremental",
            RunKind::FullRealign => "full_realign",
            RunKind::UploadAll => "upload_all",
        }
    }

    pub fn origin(&self) -> UploadOrigin {
        match self {
            RunKind::Incremental | RunKind::FullRealign => UploadOrigin::AutoUpload,
            RunKind::UploadAll => UploadOrigin::UploadAll,
        }
    }
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a trigger did nothing this cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoActiveAccount,
    AutoUploadDisabled,
    BackgroundUploadDisabled,
    MediaLibraryDenied,
    /// Account store or dedup index failed; retried on the next trigger
    StoreUnavailable,
}

/// Result of an entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Planned {
        run_id: SyncRunId,
        kind: RunKind,
        /// Catalog assets matching the filter
        scanned: u64,
        /// Assets accepted by the upload pipeline
        enqueued: u64,
    },
    Skipped(SkipReason),
    /// A run for the same account was already in flight
    Coalesced,
}

impl SyncOutcome {
    /// Accepted asset count, zero unless planned.
    pub fn enqueued(&self) -> u64 {
        match self {
            SyncOutcome::Planned { enqueued, .. } => *enqueued,
            _ => 0,
        }
    }
}

// ============================================================================
// Coordinator
// ============================================================================

/// Auto-upload engine for the active account
pub struct AutoUploadCoordinator {
    /// Account settings
    accounts: Arc<dyn AccountStore>,

    /// Assets already presented for upload
    index: Arc<dyn DedupIndex>,

    gate: Arc<AuthorizationGate>,

    planner: Arc<SyncPlanner>,

    wake: Arc<WakeTrigger>,

    /// Upload pipeline hand-off
    enqueuer: Arc<dyn UploadEnqueuer>,

    /// Source of grant changes made outside the app
    permissions: Arc<dyn PermissionProvider>,

    lifecycle: Arc<dyn LifecycleObserver>,

    event_bus: Arc<EventBus>,

    enqueue_batch_size: usize,

    /// Accounts with a run in flight
    in_flight: Arc<Mutex<HashSet<AccountId>>>,

    /// Index size after the last realign, diagnostics only
    known_asset_count: Arc<AtomicU64>,

    /// Cancels the lifecycle and permission watchers
    watchers: Arc<Mutex<Option<CancellationToken>>>,
}

impl AutoUploadCoordinator {
    /// Assemble the engine from a validated configuration and existing stores.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// let pool = create_pool(DatabaseConfig::new(&config.database_path)).await?;
    /// let coordinator = AutoUploadCoordinator::new(
    ///     &config,
    ///     Arc::new(SqliteAccountStore::new(pool.clone())),
    ///     Arc::new(SqliteDedupIndex::new(pool, config.clock.clone())),
    ///     Arc::new(EventBus::new(config.event_buffer_size)),
    /// );
    /// ```
    pub fn new(
        config: &AutoUploadConfig,
        accounts: Arc<dyn AccountStore>,
        index: Arc<dyn DedupIndex>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let wake = Arc::new(WakeTrigger::new(
            Arc::clone(&config.location_monitor),
            Arc::clone(&config.lifecycle_observer),
            Arc::clone(&accounts),
            Arc::clone(&event_bus),
            config.features.enable_background_wake,
        ));

        let gate = Arc::new(AuthorizationGate::new(
            Arc::clone(&config.permission_provider),
            Arc::clone(&accounts),
            Arc::clone(&wake),
            Arc::clone(&event_bus),
        ));

        let planner = Arc::new(SyncPlanner::new(
            AssetCatalogScanner::new(Arc::clone(&config.media_catalog)),
            Arc::clone(&index),
        ));

        Self {
            accounts,
            index,
            gate,
            planner,
            wake,
            enqueuer: Arc::clone(&config.upload_enqueuer),
            permissions: Arc::clone(&config.permission_provider),
            lifecycle: Arc::clone(&config.lifecycle_observer),
            event_bus,
            enqueue_batch_size: config.enqueue_batch_size.max(1),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            known_asset_count: Arc::new(AtomicU64::new(0)),
            watchers: Arc::new(Mutex::new(None)),
        }
    }

    /// Open the SQLite database at `config.database_path` and assemble the engine.
    ///
    /// # Errors
    ///
    /// Invalid configuration, or a database that cannot be opened or migrated.
    pub async fn open(config: AutoUploadConfig) -> Result<Self> {
        config.validate()?;

        let pool = create_pool(DatabaseConfig::new(config.database_path.clone())).await?;
        let accounts: Arc<dyn AccountStore> = Arc::new(SqliteAccountStore::new(pool.clone()));
        let index: Arc<dyn DedupIndex> =
            Arc::new(SqliteDedupIndex::new(pool, Arc::clone(&config.clock)));
        let event_bus = Arc::new(EventBus::new(config.event_buffer_size));

        Ok(Self::new(&config, accounts, index, event_bus))
    }

    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn authorization_gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    pub async fn wake_state(&self) -> WakeTriggerState {
        self.wake.state().await
    }

    /// Index size recorded by the last realign.
    pub fn known_asset_count(&self) -> u64 {
        self.known_asset_count.load(Ordering::SeqCst)
    }

    /// Subscribe to lifecycle and permission changes.
    ///
    /// Every return to the foreground runs a foreground sync; a grant revoked
    /// in system settings clears the matching flag. Calling `start` twice is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// The host refused a subscription.
    pub async fn start(&self) -> Result<()> {
        let token = {
            let mut watchers = lock(&self.watchers);
            if watchers.is_some() {
                debug!("Auto-upload watchers already running");
                return Ok(());
            }
            let token = CancellationToken::new();
            *watchers = Some(token.clone());
            token
        };

        let lifecycle_changes = match self.lifecycle.subscribe_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                *lock(&self.watchers) = None;
                return Err(e.into());
            }
        };
        let permission_changes = match self.permissions.subscribe_changes().await {
            Ok(changes) => changes,
            Err(e) => {
                *lock(&self.watchers) = None;
                return Err(e.into());
            }
        };

        let coordinator = self.clone_for_task();
        let cancellation = token.clone();
        tokio::spawn(async move {
            coordinator
                .watch_lifecycle(lifecycle_changes, cancellation)
                .await;
        });

        let coordinator = self.clone_for_task();
        tokio::spawn(async move {
            coordinator
                .watch_permissions(permission_changes, token)
                .await;
        });

        info!("Auto-upload engine started");
        Ok(())
    }

    /// Stop the watchers and the wake trigger. A run in flight completes.
    pub async fn shutdown(&self) {
        if let Some(token) = lock(&self.watchers).take() {
            token.cancel();
        }
        self.wake.stop("engine shut down").await;
        info!("Auto-upload engine stopped");
    }

    /// Incremental cycle for the active account.
    ///
    /// Runs only when `auto_upload` is set and media-library access is granted.
    /// Afterwards, if the account asks for background upload, location access
    /// is requested and the wake trigger started or stopped accordingly.
    #[instrument(skip(self))]
    pub async fn initiate_foreground_or_wake_sync(&self) -> SyncOutcome {
        let account = match self.load_active_account().await {
            Ok(Some(account)) => account,
            Ok(None) => {
                self.wake.stop("no active account").await;
                return SyncOutcome::Skipped(SkipReason::NoActiveAccount);
            }
            Err(_) => return SyncOutcome::Skipped(SkipReason::StoreUnavailable),
        };

        if !account.auto_upload {
            self.wake.stop("auto upload disabled").await;
            return SyncOutcome::Skipped(SkipReason::AutoUploadDisabled);
        }

        let Some(_guard) = self.try_begin(&account.id) else {
            return self.coalesced(&account.id);
        };

        if !self
            .gate
            .request_media_library_access(&account.id)
            .await
            .is_granted()
        {
            return SyncOutcome::Skipped(SkipReason::MediaLibraryDenied);
        }

        let outcome = self.run(&account, RunKind::Incremental).await;

        if account.auto_upload_background {
            self.update_wake_trigger(&account).await;
        } else {
            self.wake.stop("background upload disabled").await;
        }

        outcome
    }

    /// Incremental cycle started by a background location update.
    ///
    /// The account is re-read: settings may have changed since monitoring began.
    #[instrument(skip(self))]
    pub async fn initiate_wake_sync(&self) -> SyncOutcome {
        let account = match self.load_active_account().await {
            Ok(Some(account)) => account,
            Ok(None) => {
                self.wake.stop("no active account").await;
                return SyncOutcome::Skipped(SkipReason::NoActiveAccount);
            }
            Err(_) => return SyncOutcome::Skipped(SkipReason::StoreUnavailable),
        };

        if !account.auto_upload {
            self.wake.stop("auto upload disabled").await;
            return SyncOutcome::Skipped(SkipReason::AutoUploadDisabled);
        }
        if !account.auto_upload_background {
            self.wake.stop("background upload disabled").await;
            return SyncOutcome::Skipped(SkipReason::BackgroundUploadDisabled);
        }

        let Some(_guard) = self.try_begin(&account.id) else {
            return self.coalesced(&account.id);
        };

        if !self
            .gate
            .request_media_library_access(&account.id)
            .await
            .is_granted()
        {
            return SyncOutcome::Skipped(SkipReason::MediaLibraryDenied);
        }

        self.run(&account, RunKind::Incremental).await
    }

    /// Rebuild the dedup index from the catalog and enqueue every asset.
    ///
    /// Ignores the image/video/auto-upload flags; only media-library access is
    /// required. Updates the known asset count.
    #[instrument(skip(self))]
    pub async fn initiate_full_realign(&self) -> SyncOutcome {
        self.run_explicit(RunKind::FullRealign).await
    }

    /// Enqueue every catalog asset without reading or writing the dedup index.
    #[instrument(skip(self))]
    pub async fn initiate_full_scan_ignoring_index(&self) -> SyncOutcome {
        self.run_explicit(RunKind::UploadAll).await
    }

    async fn run_explicit(&self, kind: RunKind) -> SyncOutcome {
        let account = match self.load_active_account().await {
            Ok(Some(account)) => account,
            Ok(None) => return SyncOutcome::Skipped(SkipReason::NoActiveAccount),
            Err(_) => return SyncOutcome::Skipped(SkipReason::StoreUnavailable),
        };

        let Some(_guard) = self.try_begin(&account.id) else {
            return self.coalesced(&account.id);
        };

        if !self
            .gate
            .request_media_library_access(&account.id)
            .await
            .is_granted()
        {
            return SyncOutcome::Skipped(SkipReason::MediaLibraryDenied);
        }

        self.run(&account, kind).await
    }

    #[instrument(skip(self, account), fields(account_id = %account.id, kind = %kind))]
    async fn run(&self, account: &Account, kind: RunKind) -> SyncOutcome {
        let run_id = SyncRunId::new();

        self.event_bus
            .emit(CoreEvent::AutoUpload(AutoUploadEvent::Started {
                run_id: run_id.to_string(),
                account_id: account.id.to_string(),
                mode: kind.as_str().to_string(),
            }))
            .ok();

        let plan = match kind {
            RunKind::Incremental => self.planner.plan(account, ScanMode::Incremental).await,
            RunKind::FullRealign => self.planner.plan(account, ScanMode::FullRealign).await,
            RunKind::UploadAll => Ok(self.planner.plan_ignoring_index(account).await),
        };

        let SyncPlan {
            scanned, assets, ..
        } = match plan {
            Ok(plan) => plan,
            Err(e) => {
                error!(run_id = %run_id, error = %e, "Planning failed, nothing uploaded this cycle");
                self.event_bus
                    .emit(CoreEvent::AutoUpload(AutoUploadEvent::Failed {
                        run_id: run_id.to_string(),
                        account_id: account.id.to_string(),
                        message: e.to_string(),
                    }))
                    .ok();
                return SyncOutcome::Skipped(SkipReason::StoreUnavailable);
            }
        };

        if kind == RunKind::FullRealign {
            self.record_known_assets(&account.id).await;
        }

        let enqueued = self.enqueue(run_id, &account.id, assets, kind.origin()).await;
        let scanned = scanned as u64;

        self.event_bus
            .emit(CoreEvent::AutoUpload(AutoUploadEvent::Completed {
                run_id: run_id.to_string(),
                account_id: account.id.to_string(),
                scanned,
                enqueued,
            }))
            .ok();
        info!(run_id = %run_id, scanned, enqueued, "Auto-upload run completed");

        SyncOutcome::Planned {
            run_id,
            kind,
            scanned,
            enqueued,
        }
    }

    /// Hand assets to the pipeline in catalog order. Returns the accepted count.
    ///
    /// Rejected batches are logged and skipped; their identities stay indexed.
    async fn enqueue(
        &self,
        run_id: SyncRunId,
        account_id: &AccountId,
        assets: Vec<MediaAsset>,
        origin: UploadOrigin,
    ) -> u64 {
        let mut enqueued = 0;

        for batch in assets.chunks(self.enqueue_batch_size) {
            let count = batch.len() as u64;
            let reason = match self
                .enqueuer
                .enqueue(account_id.as_str(), batch.to_vec(), origin)
                .await
            {
                Ok(EnqueueOutcome::Accepted) => {
                    enqueued += count;
                    continue;
                }
                Ok(EnqueueOutcome::Rejected { reason }) => reason,
                Err(e) => e.to_string(),
            };

            warn!(run_id = %run_id, count, reason = %reason, "Upload pipeline rejected batch");
            self.event_bus
                .emit(CoreEvent::AutoUpload(AutoUploadEvent::EnqueueRejected {
                    run_id: run_id.to_string(),
                    account_id: account_id.to_string(),
                    count,
                    reason,
                }))
                .ok();
        }

        enqueued
    }

    async fn record_known_assets(&self, account_id: &AccountId) {
        let count = match self.index.count(account_id, None).await {
            Ok(count) => count,
            Err(e) => {
                warn!(error = %e, "Could not count indexed assets");
                return;
            }
        };

        if let Err(e) = self.accounts.set_known_asset_count(account_id, count).await {
            warn!(error = %e, "Could not persist known asset count");
        }
        self.known_asset_count.store(count, Ordering::SeqCst);

        self.event_bus
            .emit(CoreEvent::AutoUpload(AutoUploadEvent::IndexRealigned {
                account_id: account_id.to_string(),
                known_assets: count,
            }))
            .ok();
        info!("Align photo library {}", count);
    }

    async fn update_wake_trigger(&self, account: &Account) {
        if self
            .gate
            .request_location_access(&account.id)
            .await
            .is_granted()
        {
            let handler: Arc<dyn WakeHandler> = Arc::new(self.clone_for_task());
            self.wake.start(account, true, handler).await;
        } else {
            self.wake.stop("location access not granted").await;
        }
    }

    async fn load_active_account(&self) -> Result<Option<Account>> {
        match self.accounts.active_account().await {
            Ok(account) => {
                if let Some(account) = &account {
                    self.known_asset_count
                        .store(account.known_asset_count, Ordering::SeqCst);
                }
                Ok(account)
            }
            Err(e) => {
                warn!(error = %e, "Could not load active account");
                Err(e)
            }
        }
    }

    fn try_begin(&self, account_id: &AccountId) -> Option<InFlightGuard> {
        if !lock(&self.in_flight).insert(account_id.clone()) {
            return None;
        }

        Some(InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
            account_id: account_id.clone(),
        })
    }

    fn coalesced(&self, account_id: &AccountId) -> SyncOutcome {
        debug!(account_id = %account_id, "Run already in flight, dropping trigger");
        self.event_bus
            .emit(CoreEvent::AutoUpload(AutoUploadEvent::Coalesced {
                account_id: account_id.to_string(),
            }))
            .ok();
        SyncOutcome::Coalesced
    }

    async fn watch_lifecycle(
        &self,
        mut changes: Box<dyn LifecycleChangeStream>,
        cancellation: CancellationToken,
    ) {
        loop {
            let state = tokio::select! {
                _ = cancellation.cancelled() => break,
                state = changes.next() => state,
            };

            match state {
                Some(LifecycleState::Foreground) => {
                    let outcome = self.initiate_foreground_or_wake_sync().await;
                    debug!(?outcome, "Foreground sync finished");
                }
                Some(state) => debug!(?state, "Lifecycle changed"),
                None => break,
            }
        }
        debug!("Lifecycle watcher stopped");
    }

    async fn watch_permissions(
        &self,
        mut changes: Box<dyn PermissionChangeStream>,
        cancellation: CancellationToken,
    ) {
        loop {
            let change = tokio::select! {
                _ = cancellation.cancelled() => break,
                change = changes.next() => change,
            };

            match change {
                Some(change) => self.gate.handle_permission_change(change).await,
                None => break,
            }
        }
        debug!("Permission watcher stopped");
    }

    /// Clone for background task (avoids Arc<Arc<...>>)
    fn clone_for_task(&self) -> Self {
        Self {
            accounts: Arc::clone(&self.accounts),
            index: Arc::clone(&self.index),
            gate: Arc::clone(&self.gate),
            planner: Arc::clone(&self.planner),
            wake: Arc::clone(&self.wake),
            enqueuer: Arc::clone(&self.enqueuer),
            permissions: Arc::clone(&self.permissions),
            lifecycle: Arc::clone(&self.lifecycle),
            event_bus: Arc::clone(&self.event_bus),
            enqueue_batch_size: self.enqueue_batch_size,
            in_flight: Arc::clone(&self.in_flight),
            known_asset_count: Arc::clone(&self.known_asset_count),
            watchers: Arc::clone(&self.watchers),
        }
    }
}

#[async_trait]
impl WakeHandler for AutoUploadCoordinator {
    async fn on_wake(&self) {
        let outcome = self.initiate_wake_sync().await;
        debug!(?outcome, "Wake sync finished");
    }
}

/// Releases the account's in-flight marker when the run ends
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<AccountId>>>,
    account_id: AccountId,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.account_id);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

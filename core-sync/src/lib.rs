//! # Auto-Upload Engine
//!
//! Decides which photos and videos on the device still need to be handed to
//! the upload pipeline, and when to look.
//!
//! ## Overview
//!
//! A sync cycle runs for the active account when the app comes to the
//! foreground, when a significant location change wakes a backgrounded
//! process, or on explicit user request. Each cycle:
//! - asks for media-library access (a refusal disables auto upload)
//! - scans the device catalog for the account's media kinds
//! - keeps assets whose identity is not yet in the dedup index, recording them
//! - hands the kept assets to the upload pipeline in catalog order
//!
//! ## Components
//!
//! - **Accounts** (`account`): account settings and their persistence
//! - **Asset Identity** (`asset`): dedup key, media filter and scan mode
//! - **Dedup Index** (`dedup_index`): persisted set of identities already planned
//! - **Authorization Gate** (`authorization`): permission requests and refusal side effects
//! - **Catalog Scanner** (`scanner`): snapshot of the device media catalog
//! - **Sync Planner** (`planner`): turns a scan into the list of assets to enqueue
//! - **Wake Trigger** (`wake_trigger`): location-driven background wake-ups
//! - **Coordinator** (`coordinator`): entry points, coalescing and host watchers
//! - **Database** (`db`): SQLite pool and migrations

pub mod account;
pub mod asset;
pub mod authorization;
pub mod coordinator;
pub mod db;
pub mod dedup_index;
pub mod error;
pub mod planner;
pub mod scanner;
pub mod wake_trigger;

pub use account::{Account, AccountId, AccountStore, AutoUploadFlag, SqliteAccountStore};
pub use asset::{AssetIdentity, IndexEntry, MediaFilter, ScanMode};
pub use authorization::{Authorization, AuthorizationGate};
pub use coordinator::{AutoUploadCoordinator, RunKind, SkipReason, SyncOutcome, SyncRunId};
pub use dedup_index::{DedupIndex, SqliteDedupIndex};
pub use error::{Result, SyncError};
pub use planner::{SyncPlan, SyncPlanner};
pub use scanner::{AssetCatalogScanner, CatalogScan};
pub use wake_trigger::{WakeHandler, WakeTrigger, WakeTriggerState};

//! # Host Bridge Traits
//!
//! Capability contracts that the auto-upload core needs from the host platform.
//!
//! ## Overview
//!
//! The core never talks to operating-system services directly. Every capability
//! that behaves differently per platform (photo library access, location
//! services, app lifecycle, the upload pipeline) is expressed as a trait in this
//! crate and injected into the core at construction time.
//!
//! ## Traits
//!
//! ### Permissions & Sensors
//! - [`PermissionProvider`](permissions::PermissionProvider) - Media-library and location grants
//! - [`LocationMonitor`](location::LocationMonitor) - Significant-location-change subscription
//!
//! ### Media & Upload
//! - [`MediaCatalog`](media::MediaCatalog) - Device photo/video catalog queries
//! - [`UploadEnqueuer`](upload::UploadEnqueuer) - Hand-off to the upload pipeline
//!
//! ### Platform Integration
//! - [`LifecycleObserver`](background::LifecycleObserver) - App foreground/background transitions
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate | Status |
//! |----------|---------------------|--------|
//! | Desktop  | `bridge-desktop`    | ✅ Available |
//! | iOS      | TBD                 | 📋 Planned |
//! | Android  | TBD                 | 📋 Planned |
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`. Callbacks delivered by the host on
//! arbitrary threads are surfaced as async streams so the core can serialize
//! their handling.

pub mod background;
pub mod error;
pub mod location;
pub mod logging;
pub mod media;
pub mod permissions;
pub mod time;
pub mod upload;

pub use error::BridgeError;

// Re-export commonly used types
pub use background::{LifecycleChangeStream, LifecycleObserver, LifecycleState};
pub use location::{LocationEvent, LocationEventStream, LocationFix, LocationMonitor};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
pub use media::{MediaAsset, MediaCatalog, MediaKind};
pub use permissions::{
    AuthorizationStatus, PermissionChange, PermissionChangeStream, PermissionKind,
    PermissionProvider,
};
pub use time::{Clock, SystemClock};
pub use upload::{EnqueueOutcome, UploadEnqueuer, UploadOrigin};

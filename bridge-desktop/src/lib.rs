//! # Desktop Bridge Implementations
//!
//! Default implementations of the auto-upload bridge traits for desktop
//! platforms (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `MediaCatalog` over a directory tree ([`DirectoryMediaCatalog`])
//! - `PermissionProvider` with host-programmable grants ([`DesktopPermissionProvider`])
//! - `LocationMonitor` that never reports movement ([`StationaryLocationMonitor`])
//! - `LifecycleObserver` that is always foreground ([`DesktopLifecycleObserver`])
//!
//! The upload pipeline is host-specific and has no desktop default.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{DirectoryMediaCatalog, DesktopPermissionProvider};
//! use core_runtime::config::AutoUploadConfig;
//! use std::sync::Arc;
//!
//! let config = AutoUploadConfig::builder()
//!     .database_path("/home/alice/.local/share/autoupload/state.db")
//!     .media_catalog(Arc::new(DirectoryMediaCatalog::new("/home/alice/Pictures")))
//!     .permission_provider(Arc::new(DesktopPermissionProvider::new()))
//!     .upload_enqueuer(Arc::new(MyUploadQueue::new()))
//!     .build()?;
//! ```

mod catalog;
mod lifecycle;
mod location;
mod permissions;

pub use catalog::DirectoryMediaCatalog;
pub use lifecycle::DesktopLifecycleObserver;
pub use location::StationaryLocationMonitor;
pub use permissions::DesktopPermissionProvider;

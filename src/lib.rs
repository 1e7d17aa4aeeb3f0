//! Workspace placeholder crate.
//!
//! Host applications can depend on `autoupload-workspace` and enable the
//! `desktop-shims` feature instead of wiring `core-runtime`, `core-sync` and
//! `bridge-desktop` individually.

#[cfg(feature = "desktop-shims")]
pub use core_runtime;
#[cfg(feature = "desktop-shims")]
pub use core_sync;

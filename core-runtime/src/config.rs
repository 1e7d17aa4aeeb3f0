//! # Auto-Upload Configuration
//!
//! ## Overview
//!
//! The configuration system uses a builder to construct an [`AutoUploadConfig`]
//! holding every host bridge and tuning knob the engine needs. Validation is
//! fail-fast: missing bridges are reported at build time with an actionable
//! message instead of surfacing later as a silently idle engine.
//!
//! ## Required Dependencies
//!
//! - `MediaCatalog` - the device photo/video catalog
//! - `UploadEnqueuer` - hand-off to the upload pipeline
//!
//! ## Required Dependencies (with desktop defaults)
//!
//! - `PermissionProvider` - media-library and location grants
//! - `LocationMonitor` - significant-location-change wake source
//! - `LifecycleObserver` - foreground/background transitions
//!
//! With the `desktop-shims` feature, desktop implementations are injected for
//! these three when not provided: everything granted, a location monitor that
//! never moves, and a process that is always in the foreground.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::AutoUploadConfig;
//! use std::sync::Arc;
//!
//! let config = AutoUploadConfig::builder()
//!     .database_path("/var/lib/autoupload/state.db")
//!     .media_catalog(Arc::new(PhotoKitCatalog::new()))
//!     .upload_enqueuer(Arc::new(NextcloudUploadQueue::new()))
//!     .enqueue_batch_size(200)
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::{
    Clock, LifecycleObserver, LocationMonitor, MediaCatalog, PermissionProvider, SystemClock,
    UploadEnqueuer,
};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default number of assets handed to the upload pipeline per call
pub const DEFAULT_ENQUEUE_BATCH_SIZE: usize = 500;

/// Upper bound for [`AutoUploadConfig::enqueue_batch_size`]
pub const MAX_ENQUEUE_BATCH_SIZE: usize = 10_000;

/// Default event bus capacity
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = crate::events::DEFAULT_EVENT_BUFFER_SIZE;

/// Everything the auto-upload engine needs to run.
///
/// Use [`AutoUploadConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct AutoUploadConfig {
    /// SQLite file holding accounts and the dedup index
    pub database_path: PathBuf,

    pub media_catalog: Arc<dyn MediaCatalog>,

    pub upload_enqueuer: Arc<dyn UploadEnqueuer>,

    pub permission_provider: Arc<dyn PermissionProvider>,

    pub location_monitor: Arc<dyn LocationMonitor>,

    pub lifecycle_observer: Arc<dyn LifecycleObserver>,

    /// Time source for index timestamps
    pub clock: Arc<dyn Clock>,

    /// Planned assets are handed to the pipeline in chunks of this size
    pub enqueue_batch_size: usize,

    /// Capacity of the event bus
    pub event_buffer_size: usize,

    pub features: FeatureFlags,
}

impl fmt::Debug for AutoUploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoUploadConfig")
            .field("database_path", &self.database_path)
            .field("media_catalog", &"MediaCatalog { ... }")
            .field("upload_enqueuer", &"UploadEnqueuer { ... }")
            .field("permission_provider", &"PermissionProvider { ... }")
            .field("location_monitor", &"LocationMonitor { ... }")
            .field("lifecycle_observer", &"LifecycleObserver { ... }")
            .field("enqueue_batch_size", &self.enqueue_batch_size)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("features", &self.features)
            .finish()
    }
}

/// Feature flags control optional functionality.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureFlags {
    /// Start the significant-location wake trigger for accounts that request
    /// background upload. When off, uploads only run in the foreground.
    pub enable_background_wake: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            enable_background_wake: true,
        }
    }
}

impl AutoUploadConfig {
    pub fn builder() -> AutoUploadConfigBuilder {
        AutoUploadConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    ///
    /// This checks:
    /// - Database path is not empty
    /// - Enqueue batch size is within 1..=10,000
    /// - Event buffer size is > 0
    pub fn validate(&self) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            return Err(Error::Config("Database path cannot be empty".to_string()));
        }

        if self.enqueue_batch_size == 0 || self.enqueue_batch_size > MAX_ENQUEUE_BATCH_SIZE {
            return Err(Error::InvalidSetting {
                setting: "enqueue_batch_size",
                message: format!(
                    "must be between 1 and {}, got {}",
                    MAX_ENQUEUE_BATCH_SIZE, self.enqueue_batch_size
                ),
            });
        }

        if self.event_buffer_size == 0 {
            return Err(Error::InvalidSetting {
                setting: "event_buffer_size",
                message: "must be greater than 0".to_string(),
            });
        }

        Ok(())
    }
}

fn missing_catalog_error() -> Error {
    Error::CapabilityMissing {
        capability: "MediaCatalog".to_string(),
        message: "A MediaCatalog implementation is required to enumerate device media. \
                 iOS: wrap PHAsset fetches. Android: wrap MediaStore queries. \
                 Desktop: use bridge_desktop::DirectoryMediaCatalog."
            .to_string(),
    }
}

fn missing_enqueuer_error() -> Error {
    Error::CapabilityMissing {
        capability: "UploadEnqueuer".to_string(),
        message: "An UploadEnqueuer implementation is required to hand discovered assets \
                 to the upload pipeline."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_permission_provider() -> Result<Arc<dyn PermissionProvider>> {
    use bridge_desktop::DesktopPermissionProvider;

    let provider: Arc<dyn PermissionProvider> = Arc::new(DesktopPermissionProvider::new());
    Ok(provider)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_permission_provider() -> Result<Arc<dyn PermissionProvider>> {
    Err(Error::CapabilityMissing {
        capability: "PermissionProvider".to_string(),
        message: "A PermissionProvider is required for media-library and location grants. \
                 Desktop: enable the 'desktop-shims' feature. \
                 Mobile: inject the platform permission APIs."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_location_monitor() -> Result<Arc<dyn LocationMonitor>> {
    use bridge_desktop::StationaryLocationMonitor;

    let monitor: Arc<dyn LocationMonitor> = Arc::new(StationaryLocationMonitor::new());
    Ok(monitor)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_location_monitor() -> Result<Arc<dyn LocationMonitor>> {
    Err(Error::CapabilityMissing {
        capability: "LocationMonitor".to_string(),
        message: "A LocationMonitor is required for background wake-ups. \
                 Desktop: enable the 'desktop-shims' feature. \
                 Mobile: inject significant-location-change monitoring."
            .to_string(),
    })
}

#[cfg(feature = "desktop-shims")]
fn provide_default_lifecycle_observer() -> Result<Arc<dyn LifecycleObserver>> {
    use bridge_desktop::DesktopLifecycleObserver;

    let observer: Arc<dyn LifecycleObserver> = Arc::new(DesktopLifecycleObserver::new());
    Ok(observer)
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_lifecycle_observer() -> Result<Arc<dyn LifecycleObserver>> {
    Err(Error::CapabilityMissing {
        capability: "LifecycleObserver".to_string(),
        message: "A LifecycleObserver is required to tell foreground from background runs. \
                 Desktop: enable the 'desktop-shims' feature. \
                 Mobile: inject application lifecycle notifications."
            .to_string(),
    })
}

/// Builder for [`AutoUploadConfig`].
#[derive(Default)]
pub struct AutoUploadConfigBuilder {
    database_path: Option<PathBuf>,
    media_catalog: Option<Arc<dyn MediaCatalog>>,
    upload_enqueuer: Option<Arc<dyn UploadEnqueuer>>,
    permission_provider: Option<Arc<dyn PermissionProvider>>,
    location_monitor: Option<Arc<dyn LocationMonitor>>,
    lifecycle_observer: Option<Arc<dyn LifecycleObserver>>,
    clock: Option<Arc<dyn Clock>>,
    enqueue_batch_size: Option<usize>,
    event_buffer_size: Option<usize>,
    features: FeatureFlags,
}

impl AutoUploadConfigBuilder {
    /// Sets the SQLite database path.
    ///
    /// ```
    /// use core_runtime::config::AutoUploadConfig;
    ///
    /// let builder = AutoUploadConfig::builder().database_path("/data/autoupload.db");
    /// ```
    pub fn database_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.database_path = Some(path.into());
        self
    }

    /// Sets the media catalog (required).
    pub fn media_catalog(mut self, catalog: Arc<dyn MediaCatalog>) -> Self {
        self.media_catalog = Some(catalog);
        self
    }

    /// Sets the upload pipeline (required).
    pub fn upload_enqueuer(mut self, enqueuer: Arc<dyn UploadEnqueuer>) -> Self {
        self.upload_enqueuer = Some(enqueuer);
        self
    }

    pub fn permission_provider(mut self, provider: Arc<dyn PermissionProvider>) -> Self {
        self.permission_provider = Some(provider);
        self
    }

    pub fn location_monitor(mut self, monitor: Arc<dyn LocationMonitor>) -> Self {
        self.location_monitor = Some(monitor);
        self
    }

    pub fn lifecycle_observer(mut self, observer: Arc<dyn LifecycleObserver>) -> Self {
        self.lifecycle_observer = Some(observer);
        self
    }

    /// Overrides the time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Sets how many assets are handed to the pipeline per call.
    ///
    /// Default: 500
    pub fn enqueue_batch_size(mut self, size: usize) -> Self {
        self.enqueue_batch_size = Some(size);
        self
    }

    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Enables or disables the significant-location wake trigger.
    ///
    /// Default: true
    pub fn enable_background_wake(mut self, enabled: bool) -> Self {
        self.features.enable_background_wake = enabled;
        self
    }

    pub fn features(mut self, features: FeatureFlags) -> Self {
        self.features = features;
        self
    }

    /// Builds the final [`AutoUploadConfig`].
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] when the database path is missing or empty
    /// - [`Error::CapabilityMissing`] when a required bridge is absent and no
    ///   desktop default applies
    /// - [`Error::InvalidSetting`] when a tuning value is out of range
    pub fn build(self) -> Result<AutoUploadConfig> {
        let database_path = self.database_path.ok_or_else(|| {
            Error::Config("Database path is required. Use .database_path() to set it.".to_string())
        })?;

        let media_catalog = self.media_catalog.ok_or_else(missing_catalog_error)?;
        let upload_enqueuer = self.upload_enqueuer.ok_or_else(missing_enqueuer_error)?;

        let permission_provider = match self.permission_provider {
            Some(provider) => provider,
            None => provide_default_permission_provider()?,
        };

        let location_monitor = match self.location_monitor {
            Some(monitor) => monitor,
            None => provide_default_location_monitor()?,
        };

        let lifecycle_observer = match self.lifecycle_observer {
            Some(observer) => observer,
            None => provide_default_lifecycle_observer()?,
        };

        let config = AutoUploadConfig {
            database_path,
            media_catalog,
            upload_enqueuer,
            permission_provider,
            location_monitor,
            lifecycle_observer,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            enqueue_batch_size: self
                .enqueue_batch_size
                .unwrap_or(DEFAULT_ENQUEUE_BATCH_SIZE),
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            features: self.features,
        };

        config.validate()?;

        Ok(config)
    }
}

//! Device Media Catalog
//!
//! Read-only access to the photos and videos stored on the device.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{BridgeError, Result};

/// Kind of media item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Get the string representation for database storage
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

impl FromStr for MediaKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "image" => Ok(MediaKind::Image),
            "video" => Ok(MediaKind::Video),
            other => Err(BridgeError::Catalog(format!("Unknown media kind: {}", other))),
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A photo or video in the device catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaAsset {
    /// Opaque identifier, stable across catalog refreshes
    pub local_identifier: String,
    pub media_kind: MediaKind,
    /// Absent for some imported assets
    pub creation_date: Option<DateTime<Utc>>,
}

impl MediaAsset {
    pub fn new(
        local_identifier: impl Into<String>,
        media_kind: MediaKind,
        creation_date: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            local_identifier: local_identifier.into(),
            media_kind,
            creation_date,
        }
    }
}

/// Media catalog trait
///
/// # Platform Support
///
/// - **iOS**: `PHAsset.fetchAssets` on the user library smart album
/// - **Android**: `MediaStore` queries
/// - **Desktop**: a watched directory tree
#[async_trait]
pub trait MediaCatalog: Send + Sync {
    /// Fetch every asset whose kind is in `kinds`, in catalog order.
    ///
    /// Returns `Ok(None)` when the catalog collection itself does not exist
    /// (no camera roll, missing directory). That is not an error.
    async fn fetch_assets(&self, kinds: &[MediaKind]) -> Result<Option<Vec<MediaAsset>>>;
}

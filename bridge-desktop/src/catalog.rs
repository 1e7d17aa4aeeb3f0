//! Directory-backed Media Catalog

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    media::{MediaAsset, MediaCatalog, MediaKind},
};
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::fs;
use tracing::{debug, warn};

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "heic", "heif", "gif", "tif", "tiff", "webp", "dng",
];
const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "m4v", "avi", "mkv", "3gp"];

/// Media catalog over a directory tree, such as a camera import folder.
///
/// - Files are classified by extension; anything else is ignored, as are
///   hidden files and directories.
/// - The local identifier is the path relative to the root, with `/`
///   separators, so it stays stable when the root is moved.
/// - The creation timestamp is the file birth time, falling back to the
///   modification time on filesystems that do not record it.
/// - Assets are enumerated oldest first, ties broken by identifier.
///
/// A root that does not exist is an absent collection, not an error. A root
/// that cannot be listed is an error; unreadable subdirectories and entries
/// are logged and skipped.
#[derive(Debug, Clone)]
pub struct DirectoryMediaCatalog {
    root: PathBuf,
}

impl DirectoryMediaCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Media kind implied by a file name, if any.
    pub fn classify(path: &Path) -> Option<MediaKind> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Image)
        } else if VIDEO_EXTENSIONS.contains(&extension.as_str()) {
            Some(MediaKind::Video)
        } else {
            None
        }
    }

    fn local_identifier(&self, path: &Path) -> Result<String> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            BridgeError::Catalog(format!("{} is outside the catalog root", path.display()))
        })?;

        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Ok(parts.join("/"))
    }

    async fn walk(&self, kinds: &[MediaKind]) -> Result<Vec<MediaAsset>> {
        // The root must be listable; anything below it is best effort.
        let entries = fs::read_dir(&self.root).await?;
        let mut pending = Vec::new();
        let mut assets = Vec::new();
        self.collect_dir(entries, kinds, &mut pending, &mut assets).await?;
        self.walk_subdirs(pending, kinds, &mut assets).await?;

        assets.sort_by(|a, b| {
            a.creation_date
                .cmp(&b.creation_date)
                .then_with(|| a.local_identifier.cmp(&b.local_identifier))
        });

        Ok(assets)
    }

    /// Walk subdirectories, skipping any that cannot be listed.
    async fn walk_subdirs(
        &self,
        mut pending: Vec<PathBuf>,
        kinds: &[MediaKind],
        assets: &mut Vec<MediaAsset>,
    ) -> Result<()> {
        while let Some(dir) = pending.pop() {
            let entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(err) => {
                    warn!(error = %err, "Could not list catalog directory; skipping it");
                    continue;
                }
            };
            self.collect_dir(entries, kinds, &mut pending, assets).await?;
        }
        Ok(())
    }

    async fn collect_dir(
        &self,
        mut entries: fs::ReadDir,
        kinds: &[MediaKind],
        pending: &mut Vec<PathBuf>,
        assets: &mut Vec<MediaAsset>,
    ) -> Result<()> {
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(error = %err, "Catalog directory listing interrupted");
                    break;
                }
            };

            if is_hidden(&entry.file_name()) {
                continue;
            }

            let path = entry.path();
            let file_type = match entry.file_type().await {
                Ok(file_type) => file_type,
                Err(err) => {
                    warn!(error = %err, "Could not read catalog entry type; skipping it");
                    continue;
                }
            };
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }
            if !file_type.is_file() {
                continue;
            }

            let Some(kind) = Self::classify(&path) else {
                continue;
            };
            if !kinds.contains(&kind) {
                continue;
            }

            let creation_date = match entry.metadata().await {
                Ok(metadata) => metadata
                    .created()
                    .or_else(|_| metadata.modified())
                    .ok()
                    .map(system_time_to_utc),
                Err(err) => {
                    warn!(error = %err, "Could not read file metadata; creation date unknown");
                    None
                }
            };

            assets.push(MediaAsset::new(
                self.local_identifier(&path)?,
                kind,
                creation_date,
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaCatalog for DirectoryMediaCatalog {
    async fn fetch_assets(&self, kinds: &[MediaKind]) -> Result<Option<Vec<MediaAsset>>> {
        if !fs::try_exists(&self.root).await? {
            debug!("Catalog root does not exist; treating as empty collection");
            return Ok(None);
        }

        let assets = self.walk(kinds).await?;
        debug!(count = assets.len(), ?kinds, "Directory catalog enumerated");
        Ok(Some(assets))
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn system_time_to_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

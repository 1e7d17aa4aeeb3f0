//! # Asset Catalog Scanner
//!
//! Enumerates the device media catalog for a [`MediaFilter`].
//!
//! A scan is a snapshot: it reflects the catalog at call time, is consumed
//! once, and never consults the dedup index. An absent or unreadable catalog
//! yields an empty scan.

use crate::asset::MediaFilter;
use bridge_traits::{MediaAsset, MediaCatalog};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

pub struct AssetCatalogScanner {
    catalog: Arc<dyn MediaCatalog>,
}

impl AssetCatalogScanner {
    pub fn new(catalog: Arc<dyn MediaCatalog>) -> Self {
        Self { catalog }
    }

    /// Snapshot the catalog, in catalog order.
    #[instrument(skip(self), fields(filter = %filter))]
    pub async fn scan(&self, filter: MediaFilter) -> CatalogScan {
        let assets = match self.catalog.fetch_assets(filter.kinds()).await {
            Ok(Some(assets)) => assets,
            Ok(None) => {
                debug!("Media catalog collection is absent");
                Vec::new()
            }
            Err(e) => {
                warn!(error = %e, "Media catalog unavailable, scanning nothing this cycle");
                Vec::new()
            }
        };

        // Catalogs may hand back more than asked for.
        let assets: Vec<MediaAsset> = assets
            .into_iter()
            .filter(|asset| filter.matches(asset.media_kind))
            .collect();

        debug!(count = assets.len(), "Catalog scanned");
        CatalogScan {
            assets: assets.into_iter(),
        }
    }
}

/// Finite, single-pass sequence of catalog assets
#[derive(Debug)]
pub struct CatalogScan {
    assets: std::vec::IntoIter<MediaAsset>,
}

impl Iterator for CatalogScan {
    type Item = MediaAsset;

    fn next(&mut self) -> Option<Self::Item> {
        self.assets.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.assets.size_hint()
    }
}

impl ExactSizeIterator for CatalogScan {}

//! # Sync Planner
//!
//! Turns a catalog scan into the ordered list of assets to hand to the upload
//! pipeline, recording every planned identity in the dedup index as it goes.
//!
//! ## Modes
//!
//! - [`ScanMode::Incremental`]: scan with the account's filter and keep only
//!   identities the index has not seen. Check and record happen in one
//!   transaction through [`DedupIndex::claim_new`].
//! - [`ScanMode::FullRealign`]: clear the account's index, scan everything
//!   (`both`), re-index every asset and keep all of them.
//!
//! Kept assets retain catalog order. Identities are recorded at planning time;
//! whatever the upload pipeline later does with them, they are not planned
//! again until the next full realign.

use crate::account::Account;
use crate::asset::{IndexEntry, MediaFilter, ScanMode};
use crate::dedup_index::DedupIndex;
use crate::scanner::AssetCatalogScanner;
use crate::Result;
use bridge_traits::MediaAsset;
use core_runtime::logging::strip_path;
use std::sync::Arc;
use tracing::{debug, info, instrument, trace};

/// Result of one planning pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPlan {
    /// Filter used for the scan; `None` when the account selects no media kind
    pub filter: Option<MediaFilter>,
    /// Catalog assets matching the filter
    pub scanned: usize,
    /// Assets to enqueue, in catalog order
    pub assets: Vec<MediaAsset>,
}

impl SyncPlan {
    fn nothing_to_scan() -> Self {
        Self {
            filter: None,
            scanned: 0,
            assets: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

pub struct SyncPlanner {
    scanner: AssetCatalogScanner,
    index: Arc<dyn DedupIndex>,
}

impl SyncPlanner {
    pub fn new(scanner: AssetCatalogScanner, index: Arc<dyn DedupIndex>) -> Self {
        Self { scanner, index }
    }

    /// Plan one sync cycle for `account`.
    ///
    /// # Errors
    ///
    /// Only storage failures of the dedup index. Catalog problems produce an
    /// empty plan.
    #[instrument(skip(self, account), fields(account_id = %account.id, mode = %mode))]
    pub async fn plan(&self, account: &Account, mode: ScanMode) -> Result<SyncPlan> {
        let plan = match mode {
            ScanMode::Incremental => self.plan_incremental(account).await?,
            ScanMode::FullRealign => self.plan_full_realign(account).await?,
        };

        for asset in &plan.assets {
            trace!(
                asset = strip_path(&asset.local_identifier),
                kind = %asset.media_kind,
                "Asset planned"
            );
        }

        info!(
            scanned = plan.scanned,
            planned = plan.assets.len(),
            "Plan produced"
        );
        Ok(plan)
    }

    /// Scan everything and keep every asset without reading or writing the
    /// index.
    #[instrument(skip(self, account), fields(account_id = %account.id))]
    pub async fn plan_ignoring_index(&self, account: &Account) -> SyncPlan {
        let assets: Vec<MediaAsset> = self.scanner.scan(MediaFilter::Both).await.collect();

        info!(planned = assets.len(), "Plan produced without index");
        SyncPlan {
            filter: Some(MediaFilter::Both),
            scanned: assets.len(),
            assets,
        }
    }

    async fn plan_incremental(&self, account: &Account) -> Result<SyncPlan> {
        let Some(filter) = MediaFilter::for_account(account) else {
            debug!("Account selects neither images nor videos, skipping scan");
            return Ok(SyncPlan::nothing_to_scan());
        };

        let scanned: Vec<MediaAsset> = self.scanner.scan(filter).await.collect();
        let entries: Vec<IndexEntry> = scanned
            .iter()
            .map(|asset| IndexEntry::for_asset(&account.id, asset))
            .collect();

        let claimed = self.index.claim_new(&entries).await?;
        let total = scanned.len();
        let assets = scanned
            .into_iter()
            .zip(claimed)
            .filter_map(|(asset, new)| new.then_some(asset))
            .collect();

        Ok(SyncPlan {
            filter: Some(filter),
            scanned: total,
            assets,
        })
    }

    async fn plan_full_realign(&self, account: &Account) -> Result<SyncPlan> {
        let removed = self.index.clear_all(&account.id).await?;
        debug!(removed, "Index cleared for realign");

        let assets: Vec<MediaAsset> = self.scanner.scan(MediaFilter::Both).await.collect();
        let entries: Vec<IndexEntry> = assets
            .iter()
            .map(|asset| IndexEntry::for_asset(&account.id, asset))
            .collect();
        self.index.insert_many(&entries).await?;

        Ok(SyncPlan {
            filter: Some(MediaFilter::Both),
            scanned: assets.len(),
            assets,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetIdentity;
    use crate::db::create_test_pool;
    use crate::dedup_index::SqliteDedupIndex;
    use async_trait::async_trait;
    use bridge_traits::{error::Result as BridgeResult, MediaCatalog, MediaKind, SystemClock};
    use chrono::{TimeZone, Utc};
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct MemoryCatalog {
        assets: Mutex<Vec<MediaAsset>>,
    }

    impl MemoryCatalog {
        async fn add(&self, asset: MediaAsset) {
            self.assets.lock().await.push(asset);
        }
    }

    #[async_trait]
    impl MediaCatalog for MemoryCatalog {
        async fn fetch_assets(&self, kinds: &[MediaKind]) -> BridgeResult<Option<Vec<MediaAsset>>> {
            let assets = self.assets.lock().await;
            Ok(Some(
                assets
                    .iter()
                    .filter(|asset| kinds.contains(&asset.media_kind))
                    .cloned()
                    .collect(),
            ))
        }
    }

    fn image(id: &str, minute: u32) -> MediaAsset {
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap();
        MediaAsset::new(id, MediaKind::Image, Some(date))
    }

    fn video(id: &str, minute: u32) -> MediaAsset {
        let date = Utc.with_ymd_and_hms(2024, 5, 1, 9, minute, 0).unwrap();
        MediaAsset::new(id, MediaKind::Video, Some(date))
    }

    async fn planner(catalog: Arc<MemoryCatalog>) -> (SyncPlanner, Arc<dyn DedupIndex>) {
        let pool = create_test_pool().await.unwrap();
        let index: Arc<dyn DedupIndex> =
            Arc::new(SqliteDedupIndex::new(pool, Arc::new(SystemClock)));
        let planner = SyncPlanner::new(AssetCatalogScanner::new(catalog), index.clone());
        (planner, index)
    }

    fn account() -> Account {
        Account::new("alice")
            .with_auto_upload(true)
            .with_images(true)
            .with_videos(true)
    }

    fn ids(plan: &SyncPlan) -> Vec<&str> {
        plan.assets
            .iter()
            .map(|asset| asset.local_identifier.as_str())
            .collect()
    }

    #[tokio::test]
    async fn test_incremental_plans_only_new_assets() {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.add(image("A", 1)).await;
        let (planner, _) = planner(catalog.clone()).await;

        let first = planner.plan(&account(), ScanMode::Incremental).await.unwrap();
        assert_eq!(ids(&first), vec!["A"]);

        catalog.add(video("B", 2)).await;
        let second = planner.plan(&account(), ScanMode::Incremental).await.unwrap();
        assert_eq!(ids(&second), vec!["B"]);
        assert_eq!(second.scanned, 2);
    }

    #[tokio::test]
    async fn test_incremental_without_kinds_does_not_scan() {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.add(image("A", 1)).await;
        let (planner, index) = planner(catalog).await;

        let account = Account::new("alice").with_auto_upload(true);
        let plan = planner.plan(&account, ScanMode::Incremental).await.unwrap();

        assert_eq!(plan.filter, None);
        assert!(plan.is_empty());
        assert_eq!(index.count(&account.id, None).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_identity_in_one_scan_is_planned_once() {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.add(MediaAsset::new("A", MediaKind::Image, None)).await;
        catalog.add(MediaAsset::new("A", MediaKind::Image, None)).await;
        let (planner, _) = planner(catalog).await;

        let plan = planner.plan(&account(), ScanMode::Incremental).await.unwrap();
        assert_eq!(ids(&plan), vec!["A"]);
    }

    #[tokio::test]
    async fn test_full_realign_ignores_kind_flags() {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.add(image("A", 1)).await;
        catalog.add(video("B", 2)).await;
        let (planner, index) = planner(catalog).await;

        let account = Account::new("alice").with_images(true);
        let plan = planner.plan(&account, ScanMode::FullRealign).await.unwrap();

        assert_eq!(plan.filter, Some(MediaFilter::Both));
        assert_eq!(ids(&plan), vec!["A", "B"]);
        assert_eq!(index.count(&account.id, None).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_plan_ignoring_index_leaves_index_untouched() {
        let catalog = Arc::new(MemoryCatalog::default());
        catalog.add(image("A", 1)).await;
        catalog.add(video("B", 2)).await;
        let (planner, index) = planner(catalog).await;

        planner.plan(&account(), ScanMode::Incremental).await.unwrap();
        let before = index.count(&account().id, None).await.unwrap();

        let plan = planner.plan_ignoring_index(&account()).await;
        assert_eq!(ids(&plan), vec!["A", "B"]);
        assert_eq!(index.count(&account().id, None).await.unwrap(), before);

        let identity = AssetIdentity::for_asset(&account().id, &image("A", 1));
        assert!(index.contains(&identity).await.unwrap());
    }
}

//! # Dedup Index
//!
//! Persisted set of [`AssetIdentity`] values already presented to the upload
//! pipeline, per account.
//!
//! ## Overview
//!
//! Entries are written while a plan is produced, not when an upload finishes,
//! so an interrupted background window never re-enqueues the part of a plan
//! that was already recorded. Entries are never updated; the only deletion is
//! [`DedupIndex::clear_all`] during a full realign.
//!
//! Incremental planning goes through [`DedupIndex::claim_new`], which checks
//! and records a whole batch in one transaction. Two overlapping scans can
//! therefore never both see the same asset as new.

use crate::asset::{AssetIdentity, IndexEntry};
use crate::{AccountId, Result, SyncError};
use async_trait::async_trait;
use bridge_traits::{Clock, MediaKind};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait DedupIndex: Send + Sync {
    async fn contains(&self, identity: &AssetIdentity) -> Result<bool>;

    /// Record entries, skipping those already present.
    ///
    /// Returns the number of entries that were new.
    async fn insert_many(&self, entries: &[IndexEntry]) -> Result<u64>;

    /// Atomically record entries and report, per entry, whether it was new.
    ///
    /// The returned vector is parallel to `entries`. A duplicate inside the
    /// same batch is reported new only at its first position.
    async fn claim_new(&self, entries: &[IndexEntry]) -> Result<Vec<bool>>;

    /// Remove every entry of the account. Returns the number removed.
    async fn clear_all(&self, account_id: &AccountId) -> Result<u64>;

    /// Number of entries for the account, optionally restricted to one kind.
    async fn count(&self, account_id: &AccountId, kind: Option<MediaKind>) -> Result<u64>;
}

/// SQLite implementation of [`DedupIndex`]
pub struct SqliteDedupIndex {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteDedupIndex {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn insert_batch(&self, entries: &[IndexEntry]) -> Result<Vec<bool>> {
        let indexed_at = self.clock.unix_timestamp();
        let mut inserted = Vec::with_capacity(entries.len());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        for entry in entries {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO auto_upload_index (
                    account_id, local_identifier, creation_timestamp, media_kind, indexed_at
                ) VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(entry.identity.account_id.as_str())
            .bind(&entry.identity.local_identifier)
            .bind(&entry.identity.creation_timestamp)
            .bind(entry.media_kind.as_str())
            .bind(indexed_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

            inserted.push(result.rows_affected() == 1);
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(inserted)
    }
}

#[async_trait]
impl DedupIndex for SqliteDedupIndex {
    async fn contains(&self, identity: &AssetIdentity) -> Result<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT 1 FROM auto_upload_index
            WHERE account_id = ? AND local_identifier = ? AND creation_timestamp = ?
            "#,
        )
        .bind(identity.account_id.as_str())
        .bind(&identity.local_identifier)
        .bind(&identity.creation_timestamp)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(found.is_some())
    }

    async fn insert_many(&self, entries: &[IndexEntry]) -> Result<u64> {
        if entries.is_empty() {
            return Ok(0);
        }

        let inserted = self.insert_batch(entries).await?;
        let new = inserted.iter().filter(|&&new| new).count() as u64;

        debug!(entries = entries.len(), new, "Recorded index entries");
        Ok(new)
    }

    async fn claim_new(&self, entries: &[IndexEntry]) -> Result<Vec<bool>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        self.insert_batch(entries).await
    }

    async fn clear_all(&self, account_id: &AccountId) -> Result<u64> {
        let result = sqlx::query("DELETE FROM auto_upload_index WHERE account_id = ?")
            .bind(account_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        debug!(
            account_id = %account_id,
            removed = result.rows_affected(),
            "Cleared upload index"
        );
        Ok(result.rows_affected())
    }

    async fn count(&self, account_id: &AccountId, kind: Option<MediaKind>) -> Result<u64> {
        let count: i64 = match kind {
            Some(kind) => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM auto_upload_index WHERE account_id = ? AND media_kind = ?",
            )
            .bind(account_id.as_str())
            .bind(kind.as_str())
            .fetch_one(&self.pool)
            .await,
            None => sqlx::query_scalar::<_, i64>(
                "SELECT COUNT(*) FROM auto_upload_index WHERE account_id = ?",
            )
            .bind(account_id.as_str())
            .fetch_one(&self.pool)
            .await,
        }
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;
    use bridge_traits::MediaAsset;
    use chrono::{DateTime, TimeZone, Utc};
    use sqlx::Row;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    async fn index() -> (SqliteDedupIndex, SqlitePool) {
        let pool = create_test_pool().await.unwrap();
        let clock = Arc::new(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap()));
        (SqliteDedupIndex::new(pool.clone(), clock), pool)
    }

    fn entry(account: &str, id: &str, kind: MediaKind, minute: Option<u32>) -> IndexEntry {
        let date = minute.map(|m| Utc.with_ymd_and_hms(2024, 1, 1, 0, m, 0).unwrap());
        IndexEntry::for_asset(&account.into(), &MediaAsset::new(id, kind, date))
    }

    #[tokio::test]
    async fn test_insert_and_contains() {
        let (index, _) = index().await;
        let a = entry("alice", "A", MediaKind::Image, Some(1));

        assert!(!index.contains(&a.identity).await.unwrap());
        assert_eq!(index.insert_many(&[a.clone()]).await.unwrap(), 1);
        assert!(index.contains(&a.identity).await.unwrap());

        assert_eq!(index.insert_many(&[a]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_timestamp_is_part_of_identity() {
        let (index, _) = index().await;
        index
            .insert_many(&[entry("alice", "A", MediaKind::Image, Some(1))])
            .await
            .unwrap();

        let other_date = entry("alice", "A", MediaKind::Image, Some(2));
        let undated = entry("alice", "A", MediaKind::Image, None);
        assert!(!index.contains(&other_date.identity).await.unwrap());
        assert!(!index.contains(&undated.identity).await.unwrap());
    }

    #[tokio::test]
    async fn test_claim_new_reports_per_entry() {
        let (index, _) = index().await;
        let a = entry("alice", "A", MediaKind::Image, Some(1));
        let b = entry("alice", "B", MediaKind::Video, Some(2));
        index.insert_many(&[a.clone()]).await.unwrap();

        let claimed = index
            .claim_new(&[a.clone(), b.clone(), b.clone()])
            .await
            .unwrap();
        assert_eq!(claimed, vec![false, true, false]);

        assert_eq!(index.claim_new(&[a, b]).await.unwrap(), vec![false, false]);
    }

    #[tokio::test]
    async fn test_clear_all_is_per_account() {
        let (index, _) = index().await;
        index
            .insert_many(&[
                entry("alice", "A", MediaKind::Image, Some(1)),
                entry("alice", "B", MediaKind::Image, None),
                entry("bob", "A", MediaKind::Image, Some(1)),
            ])
            .await
            .unwrap();

        assert_eq!(index.clear_all(&"alice".into()).await.unwrap(), 2);
        assert_eq!(index.count(&"alice".into(), None).await.unwrap(), 0);
        assert_eq!(index.count(&"bob".into(), None).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_count_by_kind() {
        let (index, _) = index().await;
        index
            .insert_many(&[
                entry("alice", "A", MediaKind::Image, Some(1)),
                entry("alice", "B", MediaKind::Video, Some(2)),
                entry("alice", "C", MediaKind::Image, None),
            ])
            .await
            .unwrap();

        let alice: AccountId = "alice".into();
        assert_eq!(index.count(&alice, None).await.unwrap(), 3);
        assert_eq!(index.count(&alice, Some(MediaKind::Image)).await.unwrap(), 2);
        assert_eq!(index.count(&alice, Some(MediaKind::Video)).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_indexed_at_comes_from_clock() {
        let (index, pool) = index().await;
        index
            .insert_many(&[entry("alice", "A", MediaKind::Image, None)])
            .await
            .unwrap();

        let row = sqlx::query("SELECT indexed_at, media_kind FROM auto_upload_index")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(
            row.get::<i64, _>("indexed_at"),
            Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap().timestamp()
        );
        assert_eq!(row.get::<String, _>("media_kind"), "image");
    }

    #[tokio::test]
    async fn test_empty_batches() {
        let (index, _) = index().await;
        assert_eq!(index.insert_many(&[]).await.unwrap(), 0);
        assert!(index.claim_new(&[]).await.unwrap().is_empty());
    }
}

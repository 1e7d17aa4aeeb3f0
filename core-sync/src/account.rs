//! # Account Store
//!
//! Persistence for the accounts the engine uploads for.
//!
//! ## Overview
//!
//! Account records are owned by the host settings UI. The engine reads them at
//! the start of every cycle and writes only two things back:
//! - clearing `auto_upload` / `auto_upload_background` after a permission refusal
//! - the diagnostic known-asset count after a full realign
//!
//! At most one account is active; [`AccountStore::set_active`] swaps the marker
//! in a single transaction.

use crate::{Result, SyncError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::fmt;
use std::str::FromStr;

// ============================================================================
// ID Types
// ============================================================================

/// Identifier of a user/server pairing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// ============================================================================
// Account
// ============================================================================

/// Auto-upload settings of one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    /// Master switch for automatic upload
    pub auto_upload: bool,
    /// Keep uploading while the app is in the background
    pub auto_upload_background: bool,
    pub auto_upload_image: bool,
    pub auto_upload_video: bool,
    /// Index size after the last full realign, diagnostics only
    pub known_asset_count: u64,
}

impl Account {
    /// New account with every flag off.
    pub fn new(id: impl Into<AccountId>) -> Self {
        Self {
            id: id.into(),
            auto_upload: false,
            auto_upload_background: false,
            auto_upload_image: false,
            auto_upload_video: false,
            known_asset_count: 0,
        }
    }

    pub fn with_auto_upload(mut self, enabled: bool) -> Self {
        self.auto_upload = enabled;
        self
    }

    pub fn with_background(mut self, enabled: bool) -> Self {
        self.auto_upload_background = enabled;
        self
    }

    pub fn with_images(mut self, enabled: bool) -> Self {
        self.auto_upload_image = enabled;
        self
    }

    pub fn with_videos(mut self, enabled: bool) -> Self {
        self.auto_upload_video = enabled;
        self
    }

    /// Both switches needed for location-driven background uploads.
    pub fn wants_background_upload(&self) -> bool {
        self.auto_upload && self.auto_upload_background
    }

    pub fn flag(&self, flag: AutoUploadFlag) -> bool {
        match flag {
            AutoUploadFlag::AutoUpload => self.auto_upload,
            AutoUploadFlag::AutoUploadBackground => self.auto_upload_background,
            AutoUploadFlag::AutoUploadImage => self.auto_upload_image,
            AutoUploadFlag::AutoUploadVideo => self.auto_upload_video,
        }
    }
}

/// Persisted boolean setting of an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AutoUploadFlag {
    AutoUpload,
    AutoUploadBackground,
    AutoUploadImage,
    AutoUploadVideo,
}

impl AutoUploadFlag {
    /// Column name in the `accounts` table
    pub fn as_str(&self) -> &'static str {
        match self {
            AutoUploadFlag::AutoUpload => "auto_upload",
            AutoUploadFlag::AutoUploadBackground => "auto_upload_background",
            AutoUploadFlag::AutoUploadImage => "auto_upload_image",
            AutoUploadFlag::AutoUploadVideo => "auto_upload_video",
        }
    }
}

impl FromStr for AutoUploadFlag {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "auto_upload" => Ok(AutoUploadFlag::AutoUpload),
            "auto_upload_background" => Ok(AutoUploadFlag::AutoUploadBackground),
            "auto_upload_image" => Ok(AutoUploadFlag::AutoUploadImage),
            "auto_upload_video" => Ok(AutoUploadFlag::AutoUploadVideo),
            other => Err(SyncError::InvalidFlag(other.to_string())),
        }
    }
}

impl fmt::Display for AutoUploadFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Account persistence
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// The account currently marked active, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails
    async fn active_account(&self) -> Result<Option<Account>>;

    async fn find(&self, id: &AccountId) -> Result<Option<Account>>;

    /// Insert or update an account's settings. The active marker is untouched.
    async fn upsert(&self, account: &Account) -> Result<()>;

    /// Mark `id` as the only active account.
    ///
    /// # Errors
    ///
    /// [`SyncError::AccountNotFound`] if no such account exists
    async fn set_active(&self, id: &AccountId) -> Result<()>;

    /// Persist a single flag.
    ///
    /// # Errors
    ///
    /// [`SyncError::AccountNotFound`] if no such account exists
    async fn set_flag(&self, id: &AccountId, flag: AutoUploadFlag, enabled: bool) -> Result<()>;

    async fn set_known_asset_count(&self, id: &AccountId, count: u64) -> Result<()>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`AccountStore`]
pub struct SqliteAccountStore {
    pool: SqlitePool,
}

impl SqliteAccountStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AccountRow {
    id: String,
    auto_upload: i64,
    auto_upload_background: i64,
    auto_upload_image: i64,
    auto_upload_video: i64,
    known_asset_count: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = SyncError;

    fn try_from(row: AccountRow) -> Result<Self> {
        let known_asset_count = u64::try_from(row.known_asset_count).map_err(|_| {
            SyncError::Database(format!(
                "Invalid known_asset_count for {}: {}",
                row.id, row.known_asset_count
            ))
        })?;

        Ok(Account {
            id: AccountId::new(row.id),
            auto_upload: row.auto_upload != 0,
            auto_upload_background: row.auto_upload_background != 0,
            auto_upload_image: row.auto_upload_image != 0,
            auto_upload_video: row.auto_upload_video != 0,
            known_asset_count,
        })
    }
}

const SELECT_ACCOUNT: &str = r#"
    SELECT id, auto_upload, auto_upload_background, auto_upload_image,
           auto_upload_video, known_asset_count
    FROM accounts
"#;

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

#[async_trait]
impl AccountStore for SqliteAccountStore {
    async fn active_account(&self) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("{SELECT_ACCOUNT} WHERE is_active = 1"))
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(Account::try_from).transpose()
    }

    async fn find(&self, id: &AccountId) -> Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(&format!("{SELECT_ACCOUNT} WHERE id = ?"))
            .bind(id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        row.map(Account::try_from).transpose()
    }

    async fn upsert(&self, account: &Account) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, auto_upload, auto_upload_background, auto_upload_image,
                auto_upload_video, known_asset_count, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                auto_upload = excluded.auto_upload,
                auto_upload_background = excluded.auto_upload_background,
                auto_upload_image = excluded.auto_upload_image,
                auto_upload_video = excluded.auto_upload_video,
                known_asset_count = excluded.known_asset_count,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(account.id.as_str())
        .bind(account.auto_upload)
        .bind(account.auto_upload_background)
        .bind(account.auto_upload_image)
        .bind(account.auto_upload_video)
        .bind(account.known_asset_count as i64)
        .bind(now())
        .execute(&self.pool)
        .await
        .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn set_active(&self, id: &AccountId) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        sqlx::query("UPDATE accounts SET is_active = 0 WHERE is_active = 1")
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        let result = sqlx::query("UPDATE accounts SET is_active = 1, updated_at = ? WHERE id = ?")
            .bind(now())
            .bind(id.as_str())
            .execute(&mut *tx)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            // Dropping the transaction rolls back the cleared marker.
            return Err(SyncError::AccountNotFound {
                account_id: id.to_string(),
            });
        }

        tx.commit()
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        Ok(())
    }

    async fn set_flag(&self, id: &AccountId, flag: AutoUploadFlag, enabled: bool) -> Result<()> {
        // Column names come from a closed enum, never from input.
        let sql = format!(
            "UPDATE accounts SET {} = ?, updated_at = ? WHERE id = ?",
            flag.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(enabled)
            .bind(now())
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::AccountNotFound {
                account_id: id.to_string(),
            });
        }

        Ok(())
    }

    async fn set_known_asset_count(&self, id: &AccountId, count: u64) -> Result<()> {
        let result =
            sqlx::query("UPDATE accounts SET known_asset_count = ?, updated_at = ? WHERE id = ?")
                .bind(count as i64)
                .bind(now())
                .bind(id.as_str())
                .execute(&self.pool)
                .await
                .map_err(|e| SyncError::Database(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(SyncError::AccountNotFound {
                account_id: id.to_string(),
            });
        }

        Ok(())
    }
}

//! # Asset Identity and Scan Parameters
//!
//! The dedup key of an asset, and the two knobs a scan is driven by: which
//! media kinds to look at and whether the index is consulted.

use crate::account::{Account, AccountId};
use bridge_traits::{MediaAsset, MediaKind};
use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Dedup key of an asset for one account.
///
/// Two assets with the same identity are the same upload unit, permanently.
/// An asset without a creation date gets an empty `creation_timestamp`, so all
/// such assets sharing a local identifier collapse into one identity even if
/// the catalog later assigns them a date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetIdentity {
    pub account_id: AccountId,
    pub local_identifier: String,
    /// RFC 3339 UTC with millisecond precision, or empty
    pub creation_timestamp: String,
}

impl AssetIdentity {
    pub fn for_asset(account_id: &AccountId, asset: &MediaAsset) -> Self {
        let creation_timestamp = asset
            .creation_date
            .map(|date| date.to_rfc3339_opts(SecondsFormat::Millis, true))
            .unwrap_or_default();

        Self {
            account_id: account_id.clone(),
            local_identifier: asset.local_identifier.clone(),
            creation_timestamp,
        }
    }
}

impl fmt::Display for AssetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}@{}",
            self.account_id, self.local_identifier, self.creation_timestamp
        )
    }
}

/// A row of the dedup index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub identity: AssetIdentity,
    pub media_kind: MediaKind,
}

impl IndexEntry {
    pub fn for_asset(account_id: &AccountId, asset: &MediaAsset) -> Self {
        Self {
            identity: AssetIdentity::for_asset(account_id, asset),
            media_kind: asset.media_kind,
        }
    }
}

/// Media kinds a scan enumerates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFilter {
    Image,
    Video,
    Both,
}

impl MediaFilter {
    /// Filter implied by the account's image/video flags.
    ///
    /// `None` when neither flag is set: there is nothing to scan.
    pub fn for_account(account: &Account) -> Option<Self> {
        match (account.auto_upload_image, account.auto_upload_video) {
            (true, true) => Some(MediaFilter::Both),
            (true, false) => Some(MediaFilter::Image),
            (false, true) => Some(MediaFilter::Video),
            (false, false) => None,
        }
    }

    pub fn kinds(&self) -> &'static [MediaKind] {
        match self {
            MediaFilter::Image => &[MediaKind::Image],
            MediaFilter::Video => &[MediaKind::Video],
            MediaFilter::Both => &[MediaKind::Image, MediaKind::Video],
        }
    }

    pub fn matches(&self, kind: MediaKind) -> bool {
        self.kinds().contains(&kind)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFilter::Image => "image",
            MediaFilter::Video => "video",
            MediaFilter::Both => "both",
        }
    }
}

impl fmt::Display for MediaFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the planner treats the dedup index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanMode {
    /// Only assets whose identity is not yet indexed
    Incremental,
    /// Clear the account's index, then plan and index every asset
    FullRealign,
}

impl ScanMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanMode::Incremental => "incremental",
            ScanMode::FullRealign => "full_realign",
        }
    }
}

impl fmt::Display for ScanMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

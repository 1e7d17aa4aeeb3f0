//! Upload Pipeline Hand-off
//!
//! The engine decides *what* to upload; moving bytes belongs to the host's
//! upload pipeline, reached through [`UploadEnqueuer`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::Result, media::MediaAsset};

/// Why a batch is being uploaded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadOrigin {
    /// Discovered by automatic synchronization (incremental or realign)
    AutoUpload,
    /// Explicit "upload everything now" user action
    UploadAll,
}

/// Response of the upload pipeline to a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    Rejected { reason: String },
}

/// Upload enqueuer trait
///
/// Retrying rejected or failed uploads is the pipeline's responsibility; the
/// engine logs a rejection and moves on.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::upload::{UploadEnqueuer, UploadOrigin};
///
/// async fn hand_off(enqueuer: &dyn UploadEnqueuer, assets: Vec<MediaAsset>) {
///     match enqueuer.enqueue("alice@cloud", assets, UploadOrigin::AutoUpload).await {
///         Ok(EnqueueOutcome::Accepted) => {}
///         other => tracing::warn!(?other, "Upload batch not accepted"),
///     }
/// }
/// ```
#[async_trait]
pub trait UploadEnqueuer: Send + Sync {
    async fn enqueue(
        &self,
        account_id: &str,
        assets: Vec<MediaAsset>,
        origin: UploadOrigin,
    ) -> Result<EnqueueOutcome>;
}

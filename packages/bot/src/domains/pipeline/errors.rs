use thiserror::Error;

use crate::domains::documents::SourceError;
use crate::domains::publishing::PublishError;
use crate::domains::storage::StoreError;

/// Why a single document's pipeline stopped. Never affects sibling units.
#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("failed to prepare work directory: {0}")]
    WorkDir(#[from] std::io::Error),

    #[error("failed to download document: {0}")]
    Download(#[source] SourceError),

    #[error("failed to render document: {0}")]
    Render(#[source] anyhow::Error),

    #[error("failed to publish: {0}")]
    Publish(#[from] PublishError),

    #[error("failed to mark document as processed: {0}")]
    Store(#[from] StoreError),

    #[error("shutdown requested before the document was recorded")]
    Cancelled,
}

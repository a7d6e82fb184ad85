use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domains::documents::Document;

/// One row of `processed_documents`. The timestamp is the document's
/// published time, not the time it was processed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ProcessedRecord {
    pub title: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&Document> for ProcessedRecord {
    fn from(doc: &Document) -> Self {
        Self {
            title: doc.title.clone(),
            url: doc.url.clone(),
            timestamp: doc.published,
        }
    }
}

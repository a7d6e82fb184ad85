use thiserror::Error;

/// Failures of the document source gateway.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Transport failure, non-2xx status, or unexpected page structure.
    /// Retried on the next poll cycle.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// The page loaded but the active event lists no documents.
    #[error("no documents found for the current event")]
    NoDocuments,

    /// Title carries the recall marker; no request was made.
    #[error("document has been recalled: {title}")]
    Recalled { title: String },

    /// The download did not look like the real document (placeholder page,
    /// truncated file). Usually a recall that has not reached the title yet.
    #[error("invalid document artifact (possibly recalled): {reason}")]
    InvalidArtifact { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SourceError {
    /// Outcomes handled by posting a recall notice instead of the document.
    pub fn indicates_recall(&self) -> bool {
        matches!(
            self,
            SourceError::Recalled { .. } | SourceError::InvalidArtifact { .. }
        )
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Fetch(err.to_string())
    }
}

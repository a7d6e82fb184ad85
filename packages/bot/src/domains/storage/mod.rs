//! Persistent record of documents that have already been handled.

pub mod errors;
pub mod models;
pub mod postgres;

pub use errors::StoreError;
pub use models::ProcessedRecord;
pub use postgres::PostgresStore;

use async_trait::async_trait;

use crate::domains::documents::Document;

/// Dedup store keyed by `(title, url)`.
///
/// Marking is check-then-insert. Two workers racing on the same key cannot
/// both insert (the unique constraint holds), and the loser sees success.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether a record exists for the document. Query failures are logged and
    /// reported as `false`, so an outage can cause a re-post but never a miss.
    async fn is_processed(&self, doc: &Document) -> bool;

    /// Record a document as handled. Recording an existing key is a no-op.
    async fn mark_processed(&self, record: &ProcessedRecord) -> Result<(), StoreError>;

    async fn check_connection(&self) -> Result<(), StoreError>;

    /// Replace the underlying connection. Redundant or concurrent calls are fine.
    async fn reconnect(&self) -> Result<(), StoreError>;

    async fn close(&self);
}

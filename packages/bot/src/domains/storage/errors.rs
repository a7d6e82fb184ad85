use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection failed: {0}")]
    Connection(#[source] sqlx::Error),

    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("schema migration failed: {0}")]
    Migration(String),
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("failed to upload page {page}: {source}")]
    Upload {
        page: u32,
        #[source]
        source: anyhow::Error,
    },

    #[error("Threads API call failed: {0}")]
    Api(#[source] anyhow::Error),

    #[error("invalid number of images: {0}. Must be between 1 and 20")]
    InvalidImageCount(usize),

    #[error("container {container_id} failed with status {status}")]
    ContainerFailed {
        container_id: String,
        status: String,
    },

    #[error("container {container_id} not ready after {waited_secs}s")]
    ContainerTimeout {
        container_id: String,
        waited_secs: u64,
    },
}

// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Deciding what to post, when to mark a document done, and how to react to a
// recall lives in the domains, which use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseRenderer, BaseImageHost)

use anyhow::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use threads_client::{ContainerRequest, ContainerStatus};

use crate::domains::documents::{Document, RenderedPage, SourceError};

// =============================================================================
// Document Source Trait
// =============================================================================

#[async_trait]
pub trait BaseDocumentSource: Send + Sync {
    /// Most recent documents of the active event, newest first, at most `limit`.
    async fn list_recent(&self, limit: usize) -> std::result::Result<Vec<Document>, SourceError>;

    /// Download and validate a document into `directory`.
    async fn download(
        &self,
        doc: &Document,
        directory: &Path,
    ) -> std::result::Result<PathBuf, SourceError>;
}

// =============================================================================
// Summarizer Trait (Infrastructure - text synopsis of a PDF)
// =============================================================================

#[async_trait]
pub trait BaseSummarizer: Send + Sync {
    /// Short synopsis of the PDF at `pdf`
    async fn summarize(&self, pdf: &Path) -> Result<String>;
}

// =============================================================================
// Renderer Trait (Infrastructure - PDF pages to images)
// =============================================================================

#[async_trait]
pub trait BaseRenderer: Send + Sync {
    /// Render every page, in page order
    async fn render(&self, pdf: &Path) -> Result<Vec<RenderedPage>>;
}

// =============================================================================
// Image Host Trait
// =============================================================================

#[async_trait]
pub trait BaseImageHost: Send + Sync {
    /// Upload an image and return its public URL
    async fn upload(&self, page: &RenderedPage, title: &str, description: &str) -> Result<String>;
}

// =============================================================================
// Link Shortener Trait
// =============================================================================

#[async_trait]
pub trait BaseLinkShortener: Send + Sync {
    async fn shorten(&self, url: &str) -> Result<String>;
}

// =============================================================================
// Threads API Trait (Infrastructure - credentials are the adapter's concern)
// =============================================================================

#[async_trait]
pub trait BaseThreadsApi: Send + Sync {
    /// Create a media container, returning its id
    async fn create_container(&self, request: &ContainerRequest) -> Result<String>;

    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus>;

    /// Publish a ready container, returning the post id
    async fn publish(&self, creation_id: &str) -> Result<String>;
}

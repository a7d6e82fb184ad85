//! Multi-stage publish protocol: upload pages, stage containers, wait for the
//! platform to finish processing them, then publish.
//!
//! No call here is retried. The first failure aborts the attempt and the
//! document stays unmarked, so the next poll cycle starts it over.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use threads_client::{ContainerRequest, ContainerStatus};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::format::{format_post_text, truncate_text, MAX_POST_CHARS};
use super::PublishError;
use crate::domains::documents::RenderedPage;
use crate::kernel::{BaseImageHost, BaseLinkShortener, BaseThreadsApi};

/// Platform limit on carousel children.
pub const MAX_IMAGES: usize = 20;

/// Pacing and polling parameters of the publish protocol.
#[derive(Debug, Clone, Copy)]
pub struct PublishTimings {
    /// Pause between consecutive image uploads
    pub upload_delay: Duration,
    /// Pause between consecutive carousel item containers
    pub item_delay: Duration,
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
}

impl Default for PublishTimings {
    fn default() -> Self {
        Self {
            upload_delay: Duration::from_millis(500),
            item_delay: Duration::from_millis(500),
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(60),
        }
    }
}

pub struct Publisher {
    threads: Arc<dyn BaseThreadsApi>,
    images: Arc<dyn BaseImageHost>,
    shortener: Arc<dyn BaseLinkShortener>,
    timings: PublishTimings,
}

impl Publisher {
    pub fn new(
        threads: Arc<dyn BaseThreadsApi>,
        images: Arc<dyn BaseImageHost>,
        shortener: Arc<dyn BaseLinkShortener>,
    ) -> Self {
        Self {
            threads,
            images,
            shortener,
            timings: PublishTimings::default(),
        }
    }

    pub fn with_timings(mut self, timings: PublishTimings) -> Self {
        self.timings = timings;
        self
    }

    /// Publish a document as an image post (one page) or a carousel (2-20
    /// pages). Returns the id of the published post.
    pub async fn publish_document(
        &self,
        mut pages: Vec<RenderedPage>,
        title: &str,
        published: DateTime<Utc>,
        source_url: &str,
        summary: &str,
    ) -> Result<String, PublishError> {
        if pages.is_empty() {
            return Err(PublishError::InvalidImageCount(0));
        }
        if pages.len() > MAX_IMAGES {
            warn!(
                original = pages.len(),
                limited = MAX_IMAGES,
                "Limiting images due to Threads API limitations"
            );
            pages.truncate(MAX_IMAGES);
        }

        let image_urls = self.upload_pages(&pages, title).await?;
        drop(pages);

        let link = self.shorten_link(source_url).await;
        let text = format_post_text(title, published, link.as_deref(), summary);
        debug!(chars = text.chars().count(), "Post text formatted");

        match image_urls.len() {
            1 => {
                info!(title = %title, "Posting single image to Threads");
                self.publish_single(&image_urls[0], text).await
            }
            2..=MAX_IMAGES => {
                info!(title = %title, images = image_urls.len(), "Posting carousel to Threads");
                self.publish_carousel(&image_urls, text).await
            }
            n => Err(PublishError::InvalidImageCount(n)),
        }
    }

    /// Publish a text-only post, cut to the platform limit.
    pub async fn publish_notice(&self, text: &str) -> Result<String, PublishError> {
        let text = if text.chars().count() > MAX_POST_CHARS {
            warn!(limit = MAX_POST_CHARS, "Truncating text due to character limit");
            truncate_text(text, MAX_POST_CHARS)
        } else {
            text.to_string()
        };

        info!("Posting text-only message to Threads");
        let container_id = self
            .threads
            .create_container(&ContainerRequest::text(text))
            .await
            .map_err(PublishError::Api)?;

        self.threads
            .publish(&container_id)
            .await
            .map_err(PublishError::Api)
    }

    async fn upload_pages(
        &self,
        pages: &[RenderedPage],
        title: &str,
    ) -> Result<Vec<String>, PublishError> {
        let mut urls = Vec::with_capacity(pages.len());

        for (i, page) in pages.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.timings.upload_delay).await;
            }

            let n = page.page_number;
            let url = self
                .images
                .upload(
                    page,
                    &format!("{} - Page {}", title, n),
                    &format!("Page {} of document: {}", n, title),
                )
                .await
                .map_err(|source| PublishError::Upload { page: n, source })?;

            debug!(page = n, url = %url, "Image uploaded");
            urls.push(url);
        }

        Ok(urls)
    }

    /// Best effort: a shortener outage only costs the link line.
    async fn shorten_link(&self, source_url: &str) -> Option<String> {
        if source_url.is_empty() {
            return None;
        }
        match self.shortener.shorten(source_url).await {
            Ok(short) => Some(short),
            Err(e) => {
                warn!(url = %source_url, error = %e, "Failed to shorten URL, posting without link");
                None
            }
        }
    }

    async fn publish_single(&self, image_url: &str, text: String) -> Result<String, PublishError> {
        let container_id = self
            .threads
            .create_container(&ContainerRequest::image(image_url, text))
            .await
            .map_err(PublishError::Api)?;

        self.wait_until_ready(&container_id).await?;
        self.threads
            .publish(&container_id)
            .await
            .map_err(PublishError::Api)
    }

    async fn publish_carousel(
        &self,
        image_urls: &[String],
        text: String,
    ) -> Result<String, PublishError> {
        let mut children = Vec::with_capacity(image_urls.len());
        for (i, url) in image_urls.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.timings.item_delay).await;
            }
            let id = self
                .threads
                .create_container(&ContainerRequest::carousel_item(url.as_str()))
                .await
                .map_err(PublishError::Api)?;
            debug!(item = i + 1, container_id = %id, "Carousel item created");
            children.push(id);
        }

        for id in &children {
            self.wait_until_ready(id).await?;
        }

        let carousel_id = self
            .threads
            .create_container(&ContainerRequest::carousel(children, text))
            .await
            .map_err(PublishError::Api)?;

        self.wait_until_ready(&carousel_id).await?;
        self.threads
            .publish(&carousel_id)
            .await
            .map_err(PublishError::Api)
    }

    /// Poll until the container is ready, fails, or the timeout elapses.
    async fn wait_until_ready(&self, container_id: &str) -> Result<(), PublishError> {
        let started = Instant::now();

        loop {
            let status = self
                .threads
                .container_status(container_id)
                .await
                .map_err(PublishError::Api)?;

            if status.is_ready() {
                debug!(container_id = %container_id, "Container ready");
                return Ok(());
            }
            if status.is_terminal_failure() {
                return Err(PublishError::ContainerFailed {
                    container_id: container_id.to_string(),
                    status: describe(&status),
                });
            }
            if started.elapsed() >= self.timings.poll_timeout {
                return Err(PublishError::ContainerTimeout {
                    container_id: container_id.to_string(),
                    waited_secs: self.timings.poll_timeout.as_secs(),
                });
            }

            debug!(container_id = %container_id, status = %describe(&status), "Container not ready yet");
            tokio::time::sleep(self.timings.poll_interval).await;
        }
    }
}

fn describe(status: &ContainerStatus) -> String {
    match status {
        ContainerStatus::Finished => "FINISHED".to_string(),
        ContainerStatus::Published => "PUBLISHED".to_string(),
        ContainerStatus::InProgress => "IN_PROGRESS".to_string(),
        ContainerStatus::Error(Some(message)) => format!("ERROR ({})", message),
        ContainerStatus::Error(None) => "ERROR".to_string(),
        ContainerStatus::Expired => "EXPIRED".to_string(),
        ContainerStatus::Other(other) => other.clone(),
    }
}

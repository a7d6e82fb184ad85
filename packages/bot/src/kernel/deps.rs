//! Bot dependencies (using traits for testability)
//!
//! This module provides the central dependency container used by the pipeline.
//! All external services use trait abstractions to enable testing.

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use threads_client::{ContainerRequest, ContainerStatus, ThreadsClient};

use super::token::AccessToken;
use super::{BaseDocumentSource, BaseRenderer, BaseSummarizer, BaseThreadsApi};
use crate::domains::publishing::Publisher;
use crate::domains::storage::DocumentStore;

// =============================================================================
// ThreadsClient Adapter (implements BaseThreadsApi trait)
// =============================================================================

/// Wrapper around ThreadsClient that supplies the user id and the current
/// access token on every call
pub struct ThreadsAdapter {
    client: ThreadsClient,
    user_id: String,
    token: AccessToken,
}

impl ThreadsAdapter {
    pub fn new(client: ThreadsClient, user_id: impl Into<String>, token: AccessToken) -> Self {
        Self {
            client,
            user_id: user_id.into(),
            token,
        }
    }
}

#[async_trait]
impl BaseThreadsApi for ThreadsAdapter {
    async fn create_container(&self, request: &ContainerRequest) -> Result<String> {
        let token = self.token.current();
        Ok(self
            .client
            .create_container(&self.user_id, token.expose(), request)
            .await?)
    }

    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus> {
        let token = self.token.current();
        Ok(self
            .client
            .container_status(container_id, token.expose())
            .await?)
    }

    async fn publish(&self, creation_id: &str) -> Result<String> {
        let token = self.token.current();
        Ok(self
            .client
            .publish(&self.user_id, token.expose(), creation_id)
            .await?)
    }
}

// =============================================================================
// BotDeps
// =============================================================================

/// Everything a poll cycle and its workers need
#[derive(Clone)]
pub struct BotDeps {
    pub source: Arc<dyn BaseDocumentSource>,
    pub store: Arc<dyn DocumentStore>,
    pub summarizer: Arc<dyn BaseSummarizer>,
    pub renderer: Arc<dyn BaseRenderer>,
    pub publisher: Arc<Publisher>,
}

impl BotDeps {
    pub fn new(
        source: Arc<dyn BaseDocumentSource>,
        store: Arc<dyn DocumentStore>,
        summarizer: Arc<dyn BaseSummarizer>,
        renderer: Arc<dyn BaseRenderer>,
        publisher: Arc<Publisher>,
    ) -> Self {
        Self {
            source,
            store,
            summarizer,
            renderer,
            publisher,
        }
    }
}

//! Pure Threads Graph API REST client.
//!
//! A minimal client for publishing to Threads. Supports creating media
//! containers, checking their processing status, publishing them, and the
//! OAuth token exchange/refresh endpoints.
//!
//! The client holds no credentials: every call takes the access token to use,
//! so callers can rotate tokens without rebuilding the client.
//!
//! # Example
//!
//! ```rust,ignore
//! use threads_client::{ContainerRequest, ThreadsClient};
//!
//! let client = ThreadsClient::new();
//! let id = client
//!     .create_container("me", &token, &ContainerRequest::text("Hello"))
//!     .await?;
//! client.publish("me", &token, &id).await?;
//! ```

pub mod error;
pub mod types;

pub use error::{Result, ThreadsError};
pub use types::{ContainerRequest, ContainerStatus, LongLivedToken, MediaType, ShortLivedToken};

use serde::de::DeserializeOwned;
use types::{IdResponse, StatusResponse};

const BASE_URL: &str = "https://graph.threads.net";
const API_VERSION: &str = "v1.0";
const AUTHORIZE_URL: &str = "https://threads.net/oauth/authorize";

#[derive(Clone)]
pub struct ThreadsClient {
    client: reqwest::Client,
    base_url: String,
}

impl ThreadsClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: BASE_URL.to_string(),
        }
    }

    /// Set a custom base URL (proxies, tests).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a media container. Returns the container id.
    pub async fn create_container(
        &self,
        user_id: &str,
        access_token: &str,
        request: &ContainerRequest,
    ) -> Result<String> {
        let url = format!("{}/{}/{}/threads", self.base_url, API_VERSION, user_id);
        let mut form = request.form_fields();
        form.push(("access_token", access_token.to_string()));

        tracing::debug!(
            media_type = request.media_type.as_str(),
            is_carousel_item = request.is_carousel_item,
            children = request.children.len(),
            "Creating Threads container"
        );

        let resp = self.client.post(&url).form(&form).send().await?;
        let body: IdResponse = Self::read_json(resp).await?;
        Self::require_id(body)
    }

    /// Fetch the processing status of a container.
    pub async fn container_status(
        &self,
        container_id: &str,
        access_token: &str,
    ) -> Result<ContainerStatus> {
        let url = format!("{}/{}/{}", self.base_url, API_VERSION, container_id);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("fields", "status,error_message"),
                ("access_token", access_token),
            ])
            .send()
            .await?;

        let body: StatusResponse = Self::read_json(resp).await?;
        Ok(ContainerStatus::from_parts(&body.status, body.error_message))
    }

    /// Publish a container. Returns the id of the published post.
    pub async fn publish(
        &self,
        user_id: &str,
        access_token: &str,
        creation_id: &str,
    ) -> Result<String> {
        let url = format!(
            "{}/{}/{}/threads_publish",
            self.base_url, API_VERSION, user_id
        );
        let resp = self
            .client
            .post(&url)
            .form(&[("creation_id", creation_id), ("access_token", access_token)])
            .send()
            .await?;

        let body: IdResponse = Self::read_json(resp).await?;
        Self::require_id(body)
    }

    /// Extend a long-lived token that has not yet expired.
    pub async fn refresh_token(&self, access_token: &str) -> Result<LongLivedToken> {
        let url = format!("{}/refresh_access_token", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "th_refresh_token"),
                ("access_token", access_token),
            ])
            .send()
            .await?;

        Self::read_json(resp).await
    }

    /// Exchange a short-lived token for a long-lived one.
    pub async fn exchange_for_long_lived(
        &self,
        client_secret: &str,
        short_lived_token: &str,
    ) -> Result<LongLivedToken> {
        let url = format!("{}/access_token", self.base_url);
        let resp = self
            .client
            .get(&url)
            .query(&[
                ("grant_type", "th_exchange_token"),
                ("client_secret", client_secret),
                ("access_token", short_lived_token),
            ])
            .send()
            .await?;

        Self::read_json(resp).await
    }

    /// Exchange an OAuth authorization code for a short-lived token.
    pub async fn exchange_code(
        &self,
        client_id: &str,
        client_secret: &str,
        redirect_uri: &str,
        code: &str,
    ) -> Result<ShortLivedToken> {
        let url = format!("{}/oauth/access_token", self.base_url);
        let resp = self
            .client
            .post(&url)
            .form(&[
                ("client_id", client_id),
                ("client_secret", client_secret),
                ("grant_type", "authorization_code"),
                ("redirect_uri", redirect_uri),
                ("code", code),
            ])
            .send()
            .await?;

        Self::read_json(resp).await
    }

    /// Browser URL a user visits to grant publishing rights.
    pub fn authorization_url(client_id: &str, redirect_uri: &str) -> String {
        let mut url = url::Url::parse(AUTHORIZE_URL).expect("static authorize URL is valid");
        url.query_pairs_mut()
            .append_pair("client_id", client_id)
            .append_pair("redirect_uri", redirect_uri)
            .append_pair("scope", "threads_basic,threads_content_publish")
            .append_pair("response_type", "code");
        url.to_string()
    }

    async fn read_json<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
        let status = resp.status();
        let body = resp.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), body = %body, "Threads API request failed");
            return Err(ThreadsError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        serde_json::from_str(&body).map_err(|e| ThreadsError::Parse(format!("{e} - Body: {body}")))
    }

    fn require_id(body: IdResponse) -> Result<String> {
        if body.id.is_empty() {
            return Err(ThreadsError::EmptyId);
        }
        Ok(body.id)
    }
}

impl Default for ThreadsClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authorization_url_encodes_redirect() {
        let url = ThreadsClient::authorization_url("123", "https://example.org/cb?x=1");
        assert!(url.starts_with("https://threads.net/oauth/authorize?"));
        assert!(url.contains("client_id=123"));
        assert!(url.contains("redirect_uri=https%3A%2F%2Fexample.org%2Fcb%3Fx%3D1"));
        assert!(url.contains("response_type=code"));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ThreadsClient::new().with_base_url("http://localhost:9000/");
        assert_eq!(client.base_url(), "http://localhost:9000");
    }
}

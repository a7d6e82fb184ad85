//! Picsur image host client.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error};

use super::BaseImageHost;
use crate::common::SecretString;
use crate::domains::documents::{sanitize_filename, RenderedPage};

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    success: bool,
    #[serde(default, rename = "statusCode")]
    status_code: u16,
    #[serde(default)]
    data: Option<UploadData>,
}

#[derive(Debug, Deserialize)]
struct UploadData {
    #[serde(default)]
    id: String,
}

pub struct PicsurClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl PicsurClient {
    pub fn new(api_key: SecretString, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Public URL Picsur serves an uploaded image under.
    pub fn image_url(&self, id: &str) -> String {
        format!("{}/i/{}.jpg", self.base_url, id)
    }
}

#[async_trait]
impl BaseImageHost for PicsurClient {
    async fn upload(&self, page: &RenderedPage, title: &str, description: &str) -> Result<String> {
        debug!(title = %title, description = %description, bytes = page.png.len(), "Uploading image to Picsur");

        let part = Part::bytes(page.png.clone())
            .file_name(format!("{}.png", sanitize_filename(title)))
            .mime_str("image/png")?;
        let form = Form::new().part("image", part);

        let response = self
            .client
            .post(format!("{}/api/image/upload", self.base_url))
            .header(
                reqwest::header::AUTHORIZATION,
                format!("Api-Key {}", self.api_key.expose()),
            )
            .multipart(form)
            .send()
            .await
            .context("Picsur upload request failed")?;

        let http_status = response.status();
        let body: UploadResponse = response
            .json()
            .await
            .with_context(|| format!("Invalid Picsur response (HTTP {})", http_status))?;

        if !body.success {
            error!(status = body.status_code, "Picsur API error");
            bail!("Picsur API error: status {}", body.status_code);
        }

        let id = body.data.map(|d| d.id).unwrap_or_default();
        if id.is_empty() {
            bail!("Picsur response did not include an image id");
        }

        Ok(self.image_url(&id))
    }
}

//! URL shortener client (`POST {base}/api/shorten`).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::BaseLinkShortener;
use crate::common::SecretString;

#[derive(Serialize)]
struct ShortenRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize)]
struct ShortenResponse {
    #[serde(default)]
    short_url: String,
}

pub struct ShortenerClient {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
}

impl ShortenerClient {
    pub fn new(api_key: SecretString, base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self {
            client,
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl BaseLinkShortener for ShortenerClient {
    async fn shorten(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .post(format!("{}/api/shorten", self.base_url))
            .header("X-API-Key", self.api_key.expose())
            .json(&ShortenRequest { url })
            .send()
            .await
            .context("Shortener request failed")?;

        let status = response.status();
        if status != reqwest::StatusCode::OK && status != reqwest::StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            bail!("Shortener returned HTTP {}: {}", status.as_u16(), body);
        }

        let body: ShortenResponse = response.json().await.context("Invalid shortener response")?;
        if body.short_url.is_empty() {
            bail!("Shortener response did not include short_url");
        }
        Ok(body.short_url)
    }
}

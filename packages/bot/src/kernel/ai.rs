//! Summarizer backed by an OpenAI-compatible chat completions endpoint.
//!
//! PDF text is extracted locally and sent as the user message; the model is
//! asked for a 20-25 word synopsis focused on the decision taken.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

use super::BaseSummarizer;
use crate::common::SecretString;

const SYSTEM_PROMPT: &str = "You summarize motorsport stewards' decision documents. \
Based on the provided document, write a summary of 20-25 words. Focus on the specific \
action or decision taken: a penalty given to a driver or team, a new regulation that has \
been introduced, or that no further action was taken. Reply with the summary only.";

/// Extracted text beyond this many chars is dropped before prompting.
const MAX_PROMPT_CHARS: usize = 24_000;

#[derive(Debug, thiserror::Error)]
pub enum SummarizationError {
    #[error("failed to read PDF: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to extract PDF text: {0}")]
    Extract(String),

    #[error("document contains no extractable text")]
    EmptyText,

    #[error("summary request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("summary API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("summary response had no content")]
    EmptyResponse,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

pub struct OpenAiSummarizer {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
}

impl OpenAiSummarizer {
    pub fn new(api_key: SecretString, base_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        }
    }

    async fn complete(&self, document_text: &str) -> Result<String, SummarizationError> {
        let request = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_PROMPT,
                },
                ChatMessage {
                    role: "user",
                    content: document_text,
                },
            ],
            temperature: 0.2,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            warn!(status = %status, error = %message, "Summary API error");
            return Err(SummarizationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .ok_or(SummarizationError::EmptyResponse)
    }
}

#[async_trait]
impl BaseSummarizer for OpenAiSummarizer {
    async fn summarize(&self, pdf: &Path) -> Result<String> {
        let bytes = tokio::fs::read(pdf).await.map_err(SummarizationError::from)?;
        let text = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
            .await?
            .map_err(|e| SummarizationError::Extract(e.to_string()))?;

        let text = prepare_text(&text).ok_or(SummarizationError::EmptyText)?;
        debug!(chars = text.chars().count(), model = %self.model, "Requesting summary");

        Ok(self.complete(&text).await?)
    }
}

/// Collapse whitespace and cap the prompt size. `None` when nothing is left.
fn prepare_text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return None;
    }
    Some(collapsed.chars().take(MAX_PROMPT_CHARS).collect())
}

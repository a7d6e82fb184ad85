//! Page renderer backed by an external PDF conversion service.
//!
//! The service takes a multipart upload (`targetFormat=png`, `uploadFile`) and
//! answers with a ZIP archive holding one PNG per page.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use std::io::{Cursor, Read};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use super::BaseRenderer;
use crate::domains::documents::RenderedPage;

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("failed to read PDF: {0}")]
    Read(#[from] std::io::Error),

    #[error("conversion request failed: {0}")]
    Network(#[from] reqwest::Error),

    #[error("conversion service returned HTTP {0}")]
    Status(u16),

    #[error("invalid archive from conversion service: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("archive entry {0} is not a PNG image")]
    NotPng(String),

    #[error("conversion produced no pages")]
    Empty,
}

pub struct ConversionServiceRenderer {
    client: reqwest::Client,
    url: String,
}

impl ConversionServiceRenderer {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    async fn convert(&self, pdf: &Path) -> Result<Vec<RenderedPage>, RenderError> {
        let bytes = tokio::fs::read(pdf).await?;
        let file_name = pdf
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("application/pdf")?;
        let form = Form::new()
            .text("targetFormat", "png")
            .part("uploadFile", part);

        let response = self.client.post(&self.url).multipart(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Status(status.as_u16()));
        }

        let archive = response.bytes().await?;
        debug!(bytes = archive.len(), "Conversion archive received");
        pages_from_zip(&archive)
    }
}

#[async_trait]
impl BaseRenderer for ConversionServiceRenderer {
    async fn render(&self, pdf: &Path) -> Result<Vec<RenderedPage>> {
        Ok(self.convert(pdf).await?)
    }
}

/// Decode a ZIP of page images, ordered by the page number in each entry name.
pub fn pages_from_zip(data: &[u8]) -> Result<Vec<RenderedPage>, RenderError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))?;
    let mut entries: Vec<(Option<u32>, String, Vec<u8>)> = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let mut png = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut png)?;

        if !png.starts_with(PNG_SIGNATURE) {
            return Err(RenderError::NotPng(name));
        }
        entries.push((trailing_number(&name), name, png));
    }

    if entries.is_empty() {
        return Err(RenderError::Empty);
    }

    // Numbered entries first (by number), then anything else by name
    entries.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(&b.1)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(&b.1),
    });

    Ok(entries
        .into_iter()
        .enumerate()
        .map(|(i, (_, _, png))| RenderedPage::new(i as u32 + 1, png))
        .collect())
}

/// `doc-12.png` → 12
fn trailing_number(name: &str) -> Option<u32> {
    let stem = Path::new(name).file_stem()?.to_str()?;
    let digits: String = stem
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    digits.parse().ok()
}

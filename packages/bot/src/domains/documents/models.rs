use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A decision document discovered on the listing page.
///
/// `(title, url)` is the dedup key: titles repeat across events, URLs are
/// occasionally reused, the pair is unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub url: String,
    /// Publication time, normalized to UTC.
    pub published: DateTime<Utc>,
}

impl Document {
    pub fn new(title: impl Into<String>, url: impl Into<String>, published: DateTime<Utc>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            published,
        }
    }
}

/// One rendered page of a document, PNG encoded.
#[derive(Clone, PartialEq, Eq)]
pub struct RenderedPage {
    /// 1-based page number.
    pub page_number: u32,
    pub png: Vec<u8>,
}

impl RenderedPage {
    pub fn new(page_number: u32, png: Vec<u8>) -> Self {
        Self { page_number, png }
    }
}

impl std::fmt::Debug for RenderedPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderedPage")
            .field("page_number", &self.page_number)
            .field("bytes", &self.png.len())
            .finish()
    }
}

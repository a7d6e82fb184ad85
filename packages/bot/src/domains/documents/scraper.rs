//! FIA decision document scraper.
//!
//! - Uses reqwest for HTTP requests
//! - Uses scraper crate for HTML parsing
//! - Defeats intermediary caches on every request (the listing is known to be
//!   served stale to crawlers)
//!
//! Only rows nested under the active event are considered; structurally
//! identical rows belonging to other events are ignored.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Europe::Paris;
use rand::seq::IndexedRandom;
use scraper::{ElementRef, Html, Selector};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};
use url::Url;

use super::{Document, SourceError};
use crate::kernel::BaseDocumentSource;

/// Listing dates look like `14.03.25 17:05` (Paris local time).
const DATE_FORMAT: &str = "%d.%m.%y %H:%M";

/// Every real decision PDF starts with this signature.
const PDF_SIGNATURE: &[u8] = b"%PDF-";

/// Anything smaller is a placeholder or error page, not a decision document.
pub const MIN_DOCUMENT_BYTES: u64 = 1000;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.0 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/123.0.0.0 Safari/537.36",
];

fn random_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Document source backed by the FIA decision documents page.
pub struct FiaScraper {
    client: reqwest::Client,
    listing_url: Url,
}

impl FiaScraper {
    pub fn new(listing_url: &str) -> Result<Self, SourceError> {
        let listing_url = Url::parse(listing_url)
            .map_err(|e| SourceError::Fetch(format!("invalid listing URL {listing_url}: {e}")))?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            // No connection reuse: a kept-alive connection can land on the
            // same stale edge node.
            .pool_max_idle_per_host(0)
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()?;

        Ok(Self {
            client,
            listing_url,
        })
    }

    pub fn listing_url(&self) -> &Url {
        &self.listing_url
    }

    /// GET with a cache-busting query parameter, no-cache headers and a
    /// randomized user agent.
    async fn fetch(&self, mut url: Url) -> Result<reqwest::Response, SourceError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        url.query_pairs_mut().append_pair("_cb", &nanos.to_string());

        debug!(url = %url, "Fetching");
        let response = self
            .client
            .get(url.clone())
            .header(reqwest::header::USER_AGENT, random_user_agent())
            .header(
                reqwest::header::CACHE_CONTROL,
                "no-cache, no-store, must-revalidate",
            )
            .header(reqwest::header::PRAGMA, "no-cache")
            .header(reqwest::header::EXPIRES, "0")
            .send()
            .await
            .map_err(|e| SourceError::Fetch(format!("error visiting {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Fetch(format!("HTTP {} for {}", status, url)));
        }
        Ok(response)
    }
}

#[async_trait]
impl BaseDocumentSource for FiaScraper {
    async fn list_recent(&self, limit: usize) -> Result<Vec<Document>, SourceError> {
        info!(url = %self.listing_url, "Visiting listing page");

        let html = self
            .fetch(self.listing_url.clone())
            .await?
            .text()
            .await?;

        let mut documents = parse_listing(&html, &self.listing_url)?;
        if documents.is_empty() {
            info!("No documents found for current event");
            return Err(SourceError::NoDocuments);
        }

        documents.truncate(limit);
        debug!(count = documents.len(), "Documents fetched successfully");
        Ok(documents)
    }

    async fn download(&self, doc: &Document, directory: &Path) -> Result<PathBuf, SourceError> {
        if is_recalled(doc) {
            info!(title = %doc.title, "Document has been recalled");
            return Err(SourceError::Recalled {
                title: doc.title.clone(),
            });
        }

        let url = Url::parse(&doc.url.replace(' ', "%20"))
            .map_err(|e| SourceError::Fetch(format!("invalid document URL {}: {e}", doc.url)))?;

        let bytes = self.fetch(url).await?.bytes().await?;

        let path = directory.join(format!("{}.pdf", sanitize_filename(&doc.title)));
        tokio::fs::write(&path, &bytes).await?;

        if let Err(reason) = validate_artifact(&path).await {
            tokio::fs::remove_file(&path).await?;
            warn!(title = %doc.title, reason = %reason, "Invalid PDF file detected, possibly recalled");
            return Err(SourceError::InvalidArtifact { reason });
        }

        debug!(path = %path.display(), bytes = bytes.len(), "Document downloaded successfully");
        Ok(path)
    }
}

/// Parse the listing page into documents, most recent first.
///
/// Fails when the event grouping element is missing (the page layout changed
/// or an error page was served). An empty result means no event is active or
/// the active event has no documents yet.
pub fn parse_listing(html: &str, base_url: &Url) -> Result<Vec<Document>, SourceError> {
    let document = Html::parse_document(html);

    let wrapper_selector = selector("ul.event-wrapper");
    let active_selector = selector(".event-title.active");
    let row_selector = selector("li.document-row");

    let wrapper = document.select(&wrapper_selector).next().ok_or_else(|| {
        SourceError::Fetch("unexpected page structure: no ul.event-wrapper".to_string())
    })?;

    let Some(active_title) = wrapper.select(&active_selector).next() else {
        return Ok(Vec::new());
    };

    let Some(active_event) = active_title
        .ancestors()
        .filter_map(ElementRef::wrap)
        .find(|el| el.value().name() == "li")
    else {
        return Ok(Vec::new());
    };

    info!(event = %element_text(&active_title), "Found active event");

    let mut documents: Vec<Document> = active_event
        .select(&row_selector)
        .filter_map(|row| parse_row(&row, base_url))
        .collect();

    // Stable: rows published in the same minute keep page order.
    documents.sort_by(|a, b| b.published.cmp(&a.published));
    Ok(documents)
}

fn parse_row(row: &ElementRef<'_>, base_url: &Url) -> Option<Document> {
    let title_selector = selector(".title");
    let link_selector = selector("a[href]");
    let date_selector = selector(".published .date-display-single");

    let title = row
        .select(&title_selector)
        .next()
        .map(|el| element_text(&el))
        .filter(|t| !t.is_empty())?;

    let href = row
        .select(&link_selector)
        .next()
        .and_then(|el| el.value().attr("href"))?;

    let url = match base_url.join(href.trim()) {
        Ok(url) => url.to_string(),
        Err(e) => {
            warn!(title = %title, href = %href, error = %e, "Skipping row with invalid link");
            return None;
        }
    };

    let published_text = row
        .select(&date_selector)
        .next()
        .map(|el| element_text(&el))
        .unwrap_or_default();

    let published = parse_published(&published_text).unwrap_or_else(|| {
        warn!(title = %title, date = %published_text, "Unparseable date, listing with epoch time");
        DateTime::<Utc>::UNIX_EPOCH
    });

    debug!(title = %title, published = %published, "Found document");
    Some(Document::new(title, url, published))
}

/// Parse a listing timestamp as Paris local time, falling back to UTC.
pub fn parse_published(text: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(text.trim(), DATE_FORMAT).ok()?;
    match Paris.from_local_datetime(&naive).earliest() {
        Some(local) => Some(local.with_timezone(&Utc)),
        // Falls in the spring-forward gap
        None => Some(Utc.from_utc_datetime(&naive)),
    }
}

/// Whether the title marks the document as recalled.
pub fn is_recalled(doc: &Document) -> bool {
    let title = doc.title.to_lowercase();
    title.starts_with("recalled") || title.contains("recalled -")
}

/// Replace characters that are unsafe in file names.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    let cleaned = cleaned.trim();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        "document".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Check the PDF signature and minimum size of a downloaded file.
pub async fn validate_artifact(path: &Path) -> Result<(), String> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| format!("cannot read downloaded file: {e}"))?;

    if !bytes.starts_with(PDF_SIGNATURE) {
        return Err("file does not have a valid PDF signature".to_string());
    }
    if (bytes.len() as u64) < MIN_DOCUMENT_BYTES {
        return Err(format!(
            "file is too small to be a decision document ({} bytes)",
            bytes.len()
        ));
    }
    Ok(())
}

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("static selector is valid")
}

fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

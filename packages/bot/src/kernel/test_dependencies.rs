// TestDependencies - mock implementations for testing
//
// Provides mock ports that can be injected into BotDeps for tests. Every mock
// records its calls so tests can assert on what the pipeline did.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use threads_client::{ContainerRequest, ContainerStatus};

use super::{
    BaseDocumentSource, BaseImageHost, BaseLinkShortener, BaseRenderer, BaseSummarizer,
    BaseThreadsApi, BotDeps,
};
use crate::domains::documents::{Document, RenderedPage, SourceError};
use crate::domains::publishing::{PublishTimings, Publisher};
use crate::domains::storage::{DocumentStore, ProcessedRecord, StoreError};

// =============================================================================
// Mock Document Source
// =============================================================================

/// Canned outcome of a listing call
#[derive(Debug, Clone)]
pub enum ListingResponse {
    Documents(Vec<Document>),
    NoDocuments,
    FetchError(String),
}

/// Canned failure of a download call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadFailure {
    Recalled,
    InvalidArtifact,
    Fetch,
}

pub struct MockDocumentSource {
    listings: Mutex<VecDeque<ListingResponse>>,
    fallback: Mutex<ListingResponse>,
    download_failures: Mutex<HashMap<String, DownloadFailure>>,
    list_calls: AtomicUsize,
    downloads: Mutex<Vec<String>>,
}

impl MockDocumentSource {
    pub fn new() -> Self {
        Self {
            listings: Mutex::new(VecDeque::new()),
            fallback: Mutex::new(ListingResponse::NoDocuments),
            download_failures: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            downloads: Mutex::new(Vec::new()),
        }
    }

    /// Every listing call returns these documents
    pub fn with_documents(self, docs: Vec<Document>) -> Self {
        *self.fallback.lock().unwrap() = ListingResponse::Documents(docs);
        self
    }

    /// Queue a one-off listing response, consumed before the fallback
    pub fn with_listing(self, response: ListingResponse) -> Self {
        self.listings.lock().unwrap().push_back(response);
        self
    }

    pub fn with_download_failure(self, title: &str, failure: DownloadFailure) -> Self {
        self.download_failures
            .lock()
            .unwrap()
            .insert(title.to_string(), failure);
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    /// Titles of every download attempt
    pub fn downloads(&self) -> Vec<String> {
        self.downloads.lock().unwrap().clone()
    }
}

impl Default for MockDocumentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseDocumentSource for MockDocumentSource {
    async fn list_recent(&self, limit: usize) -> std::result::Result<Vec<Document>, SourceError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        let response = self
            .listings
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.lock().unwrap().clone());

        match response {
            ListingResponse::Documents(mut docs) if !docs.is_empty() => {
                docs.truncate(limit);
                Ok(docs)
            }
            ListingResponse::Documents(_) | ListingResponse::NoDocuments => {
                Err(SourceError::NoDocuments)
            }
            ListingResponse::FetchError(message) => Err(SourceError::Fetch(message)),
        }
    }

    async fn download(
        &self,
        doc: &Document,
        directory: &Path,
    ) -> std::result::Result<PathBuf, SourceError> {
        self.downloads.lock().unwrap().push(doc.title.clone());

        let failure = self.download_failures.lock().unwrap().get(&doc.title).copied();
        match failure {
            Some(DownloadFailure::Recalled) => Err(SourceError::Recalled {
                title: doc.title.clone(),
            }),
            Some(DownloadFailure::InvalidArtifact) => Err(SourceError::InvalidArtifact {
                reason: "file does not have a valid PDF signature".to_string(),
            }),
            Some(DownloadFailure::Fetch) => Err(SourceError::Fetch("HTTP 503".to_string())),
            None => {
                let path = directory.join("document.pdf");
                let mut body = b"%PDF-1.7\n".to_vec();
                body.resize(2048, b' ');
                tokio::fs::write(&path, body).await?;
                Ok(path)
            }
        }
    }
}

// =============================================================================
// Mock Store
// =============================================================================

pub struct MockStore {
    keys: Mutex<HashSet<(String, String)>>,
    writes: Mutex<Vec<ProcessedRecord>>,
    failing_checks: AtomicUsize,
    failing_reconnects: AtomicUsize,
    check_calls: AtomicUsize,
    reconnect_calls: AtomicUsize,
    failing_lookups: Mutex<bool>,
    drop_after_check: Mutex<Option<usize>>,
    connection_down: AtomicBool,
}

impl MockStore {
    pub fn new() -> Self {
        Self {
            keys: Mutex::new(HashSet::new()),
            writes: Mutex::new(Vec::new()),
            failing_checks: AtomicUsize::new(0),
            failing_reconnects: AtomicUsize::new(0),
            check_calls: AtomicUsize::new(0),
            reconnect_calls: AtomicUsize::new(0),
            failing_lookups: Mutex::new(false),
            drop_after_check: Mutex::new(None),
            connection_down: AtomicBool::new(false),
        }
    }

    /// Pre-populate processed keys (not counted as writes)
    pub fn with_processed(self, docs: &[Document]) -> Self {
        {
            let mut keys = self.keys.lock().unwrap();
            for doc in docs {
                keys.insert((doc.title.clone(), doc.url.clone()));
            }
        }
        self
    }

    /// The next `n` connection checks fail
    pub fn with_failing_checks(self, n: usize) -> Self {
        self.failing_checks.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` reconnect attempts fail
    pub fn with_failing_reconnects(self, n: usize) -> Self {
        self.failing_reconnects.store(n, Ordering::SeqCst);
        self
    }

    /// `is_processed` behaves as if every query errored
    pub fn with_failing_lookups(self) -> Self {
        *self.failing_lookups.lock().unwrap() = true;
        self
    }

    /// The connection drops right after the `n`th connection check and stays
    /// down until `reconnect`. While down, lookups fail open and writes fail.
    pub fn with_connection_dropping_after(self, n: usize) -> Self {
        *self.drop_after_check.lock().unwrap() = Some(n);
        self
    }

    /// Records actually inserted
    pub fn writes(&self) -> Vec<ProcessedRecord> {
        self.writes.lock().unwrap().clone()
    }

    pub fn check_calls(&self) -> usize {
        self.check_calls.load(Ordering::SeqCst)
    }

    pub fn reconnect_calls(&self) -> usize {
        self.reconnect_calls.load(Ordering::SeqCst)
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MockStore {
    async fn is_processed(&self, doc: &Document) -> bool {
        if *self.failing_lookups.lock().unwrap() || self.connection_down.load(Ordering::SeqCst) {
            return false;
        }
        self.keys
            .lock()
            .unwrap()
            .contains(&(doc.title.clone(), doc.url.clone()))
    }

    async fn mark_processed(&self, record: &ProcessedRecord) -> std::result::Result<(), StoreError> {
        if self.connection_down.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(sqlx::Error::PoolTimedOut));
        }
        let inserted = self
            .keys
            .lock()
            .unwrap()
            .insert((record.title.clone(), record.url.clone()));
        if inserted {
            self.writes.lock().unwrap().push(record.clone());
        }
        Ok(())
    }

    async fn check_connection(&self) -> std::result::Result<(), StoreError> {
        let call = self.check_calls.fetch_add(1, Ordering::SeqCst) + 1;
        if Self::take_failure(&self.failing_checks) || self.connection_down.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(sqlx::Error::PoolTimedOut));
        }
        let mut drop_after = self.drop_after_check.lock().unwrap();
        if *drop_after == Some(call) {
            *drop_after = None;
            self.connection_down.store(true, Ordering::SeqCst);
        }
        Ok(())
    }

    async fn reconnect(&self) -> std::result::Result<(), StoreError> {
        self.reconnect_calls.fetch_add(1, Ordering::SeqCst);
        if Self::take_failure(&self.failing_reconnects) {
            return Err(StoreError::Connection(sqlx::Error::PoolTimedOut));
        }
        self.connection_down.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {}
}

// =============================================================================
// Mock Summarizer
// =============================================================================

pub struct MockSummarizer {
    summary: Option<String>,
    delay: Duration,
    calls: AtomicUsize,
}

impl MockSummarizer {
    pub const SUMMARY: &'static str = "Car 1 receives a five second time penalty for leaving the track.";

    pub fn new() -> Self {
        Self {
            summary: Some(Self::SUMMARY.to_string()),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            summary: None,
            ..Self::new()
        }
    }

    /// Respond only after `delay`
    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::new()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseSummarizer for MockSummarizer {
    async fn summarize(&self, _pdf: &Path) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.summary
            .clone()
            .ok_or_else(|| anyhow!("summary service unavailable"))
    }
}

// =============================================================================
// Mock Renderer
// =============================================================================

pub struct MockRenderer {
    pages: Option<u32>,
    calls: AtomicUsize,
}

impl MockRenderer {
    pub fn with_pages(pages: u32) -> Self {
        Self {
            pages: Some(pages),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            pages: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BaseRenderer for MockRenderer {
    async fn render(&self, _pdf: &Path) -> Result<Vec<RenderedPage>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pages = self
            .pages
            .ok_or_else(|| anyhow!("conversion service returned HTTP 500"))?;
        Ok((1..=pages)
            .map(|n| RenderedPage::new(n, b"\x89PNG\r\n\x1a\n".to_vec()))
            .collect())
    }
}

// =============================================================================
// Mock Image Host
// =============================================================================

/// Arguments captured from an upload call
#[derive(Debug, Clone)]
pub struct UploadCall {
    pub page_number: u32,
    pub title: String,
    pub description: String,
}

pub struct MockImageHost {
    uploads: Mutex<Vec<UploadCall>>,
    fail_at: Option<u32>,
}

impl MockImageHost {
    pub fn new() -> Self {
        Self {
            uploads: Mutex::new(Vec::new()),
            fail_at: None,
        }
    }

    /// Fail the upload of this page number
    pub fn failing_at(page_number: u32) -> Self {
        Self {
            fail_at: Some(page_number),
            ..Self::new()
        }
    }

    pub fn uploads(&self) -> Vec<UploadCall> {
        self.uploads.lock().unwrap().clone()
    }
}

impl Default for MockImageHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseImageHost for MockImageHost {
    async fn upload(&self, page: &RenderedPage, title: &str, description: &str) -> Result<String> {
        if self.fail_at == Some(page.page_number) {
            return Err(anyhow!("Picsur API error: status 500"));
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push(UploadCall {
            page_number: page.page_number,
            title: title.to_string(),
            description: description.to_string(),
        });
        Ok(format!("https://img.test/i/{}.jpg", uploads.len()))
    }
}

// =============================================================================
// Mock Link Shortener
// =============================================================================

pub struct MockShortener {
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl MockShortener {
    pub const SHORT_URL: &'static str = "https://s.test/abc";

    pub fn new() -> Self {
        Self {
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl Default for MockShortener {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseLinkShortener for MockShortener {
    async fn shorten(&self, url: &str) -> Result<String> {
        self.calls.lock().unwrap().push(url.to_string());
        if self.fail {
            return Err(anyhow!("Shortener returned HTTP 502"));
        }
        Ok(Self::SHORT_URL.to_string())
    }
}

// =============================================================================
// Mock Threads API
// =============================================================================

pub struct MockThreadsApi {
    requests: Mutex<Vec<ContainerRequest>>,
    statuses: Mutex<VecDeque<ContainerStatus>>,
    status_calls: Mutex<Vec<String>>,
    published: Mutex<Vec<String>>,
    fail_create: bool,
}

impl MockThreadsApi {
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            status_calls: Mutex::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            fail_create: false,
        }
    }

    /// Status responses served in order; `FINISHED` once exhausted
    pub fn with_statuses(self, statuses: Vec<ContainerStatus>) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    /// Every container creation is rejected
    pub fn failing() -> Self {
        Self {
            fail_create: true,
            ..Self::new()
        }
    }

    /// Every container request, in order. Container N has id `container-N`.
    pub fn requests(&self) -> Vec<ContainerRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn status_calls(&self) -> Vec<String> {
        self.status_calls.lock().unwrap().clone()
    }

    /// Container ids that were published
    pub fn published(&self) -> Vec<String> {
        self.published.lock().unwrap().clone()
    }

    /// Requests of the containers that were published
    pub fn published_requests(&self) -> Vec<ContainerRequest> {
        let requests = self.requests();
        self.published()
            .iter()
            .filter_map(|id| {
                let index: usize = id.strip_prefix("container-")?.parse().ok()?;
                requests.get(index.checked_sub(1)?).cloned()
            })
            .collect()
    }
}

impl Default for MockThreadsApi {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BaseThreadsApi for MockThreadsApi {
    async fn create_container(&self, request: &ContainerRequest) -> Result<String> {
        if self.fail_create {
            return Err(anyhow!("Threads API error (HTTP 400): invalid parameter"));
        }
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(format!("container-{}", requests.len()))
    }

    async fn container_status(&self, container_id: &str) -> Result<ContainerStatus> {
        self.status_calls
            .lock()
            .unwrap()
            .push(container_id.to_string());
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ContainerStatus::Finished))
    }

    async fn publish(&self, creation_id: &str) -> Result<String> {
        let mut published = self.published.lock().unwrap();
        published.push(creation_id.to_string());
        Ok(format!("post-{}", published.len()))
    }
}

// =============================================================================
// TestDependencies
// =============================================================================

/// Builder for a `BotDeps` wired entirely to mocks.
pub struct TestDependencies {
    pub source: Arc<MockDocumentSource>,
    pub store: Arc<MockStore>,
    pub summarizer: Arc<MockSummarizer>,
    pub renderer: Arc<MockRenderer>,
    pub images: Arc<MockImageHost>,
    pub shortener: Arc<MockShortener>,
    pub threads: Arc<MockThreadsApi>,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            source: Arc::new(MockDocumentSource::new()),
            store: Arc::new(MockStore::new()),
            summarizer: Arc::new(MockSummarizer::new()),
            renderer: Arc::new(MockRenderer::with_pages(2)),
            images: Arc::new(MockImageHost::new()),
            shortener: Arc::new(MockShortener::new()),
            threads: Arc::new(MockThreadsApi::new()),
        }
    }

    pub fn source(mut self, source: MockDocumentSource) -> Self {
        self.source = Arc::new(source);
        self
    }

    pub fn store(mut self, store: MockStore) -> Self {
        self.store = Arc::new(store);
        self
    }

    pub fn summarizer(mut self, summarizer: MockSummarizer) -> Self {
        self.summarizer = Arc::new(summarizer);
        self
    }

    pub fn renderer(mut self, renderer: MockRenderer) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }

    pub fn threads(mut self, threads: MockThreadsApi) -> Self {
        self.threads = Arc::new(threads);
        self
    }

    /// Deps with fast publish pacing
    pub fn deps(&self) -> BotDeps {
        let publisher = Publisher::new(
            self.threads.clone(),
            self.images.clone(),
            self.shortener.clone(),
        )
        .with_timings(PublishTimings {
            upload_delay: Duration::from_millis(1),
            item_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(5),
            poll_timeout: Duration::from_millis(200),
        });

        BotDeps::new(
            self.source.clone(),
            self.store.clone(),
            self.summarizer.clone(),
            self.renderer.clone(),
            Arc::new(publisher),
        )
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

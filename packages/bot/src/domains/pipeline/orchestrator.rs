//! Poll loop: list, filter, dispatch, wait, sleep.
//!
//! ```text
//! loop
//!   ├─► StoreGuard::ensure()
//!   ├─► source.list_recent(N)
//!   ├─► for each document
//!   │     ├─ StoreGuard::ensure()
//!   │     ├─ processed?  → skip
//!   │     ├─ recalled?   → notice + mark (inline)
//!   │     └─ otherwise   → permit → spawn process_document
//!   ├─► wait for every spawned unit
//!   └─► sleep(poll_interval)
//! ```
//!
//! Cycles never overlap, so a document seen in one cycle is either recorded
//! or abandoned before the next listing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::guard::sleep_or_cancel;
use super::worker::{process_document, publish_recall_notice, InFlight, Outcome};
use super::{ProcessingError, StoreGuard};
use crate::config::Config;
use crate::domains::documents::{is_recalled, Document, SourceError};
use crate::kernel::BotDeps;

/// Tunables of the poll loop.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub poll_interval: Duration,
    pub documents_per_cycle: usize,
    pub max_concurrent: usize,
    pub work_dir: PathBuf,
    pub summary_timeout: Duration,
    /// How long in-flight units get to finish after shutdown is requested
    pub shutdown_grace: Duration,
    pub store_retry_short: Duration,
    pub store_retry_long: Duration,
}

impl PipelineSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            poll_interval: config.scrape_interval,
            documents_per_cycle: config.documents_to_fetch,
            max_concurrent: config.max_concurrent_processing,
            work_dir: PathBuf::from(&config.work_dir),
            summary_timeout: config.summary_timeout,
            shutdown_grace: Duration::from_secs(30),
            store_retry_short: Duration::from_secs(5),
            store_retry_long: Duration::from_secs(30),
        }
    }
}

/// What happened in one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub listed: usize,
    pub skipped: usize,
    pub recall_notices: usize,
    pub dispatched: usize,
    pub published: usize,
    pub failed: usize,
}

pub struct Orchestrator {
    deps: BotDeps,
    settings: PipelineSettings,
    guard: Arc<StoreGuard>,
    permits: Arc<Semaphore>,
    in_flight: Arc<AtomicUsize>,
}

impl Orchestrator {
    pub fn new(deps: BotDeps, settings: PipelineSettings) -> Self {
        let guard = StoreGuard::new(
            deps.store.clone(),
            settings.store_retry_short,
            settings.store_retry_long,
        );
        let permits = Arc::new(Semaphore::new(settings.max_concurrent.max(1)));

        Self {
            deps,
            settings,
            guard: Arc::new(guard),
            permits,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Shared count of units currently running.
    pub fn in_flight(&self) -> Arc<AtomicUsize> {
        self.in_flight.clone()
    }

    /// Run cycles until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(
            interval_secs = self.settings.poll_interval.as_secs(),
            max_concurrent = self.settings.max_concurrent,
            "Starting document poll loop"
        );

        while !cancel.is_cancelled() {
            let report = self.run_cycle(&cancel).await;
            debug!(?report, "Cycle finished");

            if !sleep_or_cancel(self.settings.poll_interval, &cancel).await {
                break;
            }
        }

        info!("Document poll loop stopped");
    }

    /// One full cycle. Returns once every unit it started has finished (or
    /// the shutdown grace period ran out).
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> CycleReport {
        let mut report = CycleReport::default();

        if !self.guard.ensure(cancel).await {
            return report;
        }

        let documents = match self
            .deps
            .source
            .list_recent(self.settings.documents_per_cycle)
            .await
        {
            Ok(docs) => docs,
            Err(SourceError::NoDocuments) => {
                info!("No documents found, will retry next cycle");
                return report;
            }
            Err(e) => {
                error!(error = %e, "Error fetching documents");
                return report;
            }
        };
        report.listed = documents.len();

        let mut units = JoinSet::new();

        for doc in documents {
            if cancel.is_cancelled() {
                break;
            }

            // A lookup against a dropped connection fails open
            if !self.guard.ensure(cancel).await {
                break;
            }
            if self.deps.store.is_processed(&doc).await {
                debug!(title = %doc.title, "Skipping already processed document");
                report.skipped += 1;
                continue;
            }

            if is_recalled(&doc) {
                info!(title = %doc.title, "Document is recalled, posting notice");
                match publish_recall_notice(&self.deps, &self.guard, &doc, cancel).await {
                    Ok(()) => report.recall_notices += 1,
                    Err(e) => {
                        error!(title = %doc.title, error = %e, "Failed to post recall notice");
                        report.failed += 1;
                    }
                }
                continue;
            }

            let permit = tokio::select! {
                _ = cancel.cancelled() => break,
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let deps = self.deps.clone();
            let guard = self.guard.clone();
            let work_dir = self.settings.work_dir.clone();
            let summary_timeout = self.settings.summary_timeout;
            let unit_cancel = cancel.clone();
            let in_flight = InFlight::enter(&self.in_flight);

            info!(title = %doc.title, "Processing document");
            report.dispatched += 1;
            units.spawn(async move {
                let _permit = permit;
                let _in_flight = in_flight;
                let result =
                    process_document(&deps, &guard, &doc, &work_dir, summary_timeout, &unit_cancel)
                        .await;
                (doc, result)
            });
        }

        self.await_units(&mut units, &mut report, cancel).await;

        if report.dispatched > 0 || report.recall_notices > 0 {
            info!(
                listed = report.listed,
                published = report.published,
                recall_notices = report.recall_notices,
                failed = report.failed,
                "Cycle complete"
            );
        }
        report
    }

    async fn await_units(
        &self,
        units: &mut JoinSet<(Document, Result<Outcome, ProcessingError>)>,
        report: &mut CycleReport,
        cancel: &CancellationToken,
    ) {
        let mut deadline: Option<Instant> = None;

        loop {
            let next = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, units.join_next()).await {
                    Ok(next) => next,
                    Err(_) => {
                        warn!(
                            remaining = units.len(),
                            "Shutdown grace period elapsed, aborting in-flight documents"
                        );
                        units.abort_all();
                        while units.join_next().await.is_some() {
                            report.failed += 1;
                        }
                        return;
                    }
                },
                None => tokio::select! {
                    next = units.join_next() => next,
                    _ = cancel.cancelled() => {
                        info!(
                            in_flight = units.len(),
                            grace_secs = self.settings.shutdown_grace.as_secs(),
                            "Shutdown requested, waiting for in-flight documents"
                        );
                        deadline = Some(Instant::now() + self.settings.shutdown_grace);
                        continue;
                    }
                },
            };

            match next {
                None => return,
                Some(Ok((doc, Ok(Outcome::Published { .. })))) => {
                    debug!(title = %doc.title, "Unit finished");
                    report.published += 1;
                }
                Some(Ok((_, Ok(Outcome::RecallNoticed)))) => report.recall_notices += 1,
                Some(Ok((doc, Err(e)))) => {
                    error!(title = %doc.title, error = %e, "Error processing document");
                    report.failed += 1;
                }
                Some(Err(e)) => {
                    error!(error = %e, "Document task panicked or was cancelled");
                    report.failed += 1;
                }
            }
        }
    }

    /// Units currently running.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{
        ListingResponse, MockDocumentSource, MockStore, MockSummarizer, MockThreadsApi,
        TestDependencies,
    };
    use chrono::{TimeZone, Utc};
    use threads_client::MediaType;

    fn settings(work_dir: &std::path::Path) -> PipelineSettings {
        PipelineSettings {
            poll_interval: Duration::from_millis(10),
            documents_per_cycle: 8,
            max_concurrent: 5,
            work_dir: work_dir.to_path_buf(),
            summary_timeout: Duration::from_millis(200),
            shutdown_grace: Duration::from_millis(200),
            store_retry_short: Duration::from_millis(5),
            store_retry_long: Duration::from_millis(10),
        }
    }

    fn doc(n: u32, title: &str) -> Document {
        Document::new(
            title,
            format!("https://www.fia.com/sites/default/files/doc_{}.pdf", n),
            Utc.with_ymd_and_hms(2025, 3, 21, 10, n, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn all_processed_cycle_does_nothing() {
        let docs = vec![doc(1, "Doc 1"), doc(2, "Doc 2")];
        let test = TestDependencies::new()
            .source(MockDocumentSource::new().with_documents(docs.clone()))
            .store(MockStore::new().with_processed(&docs));
        let work = tempfile::tempdir().unwrap();

        let report = Orchestrator::new(test.deps(), settings(work.path()))
            .run_cycle(&CancellationToken::new())
            .await;

        assert_eq!(report.skipped, 2);
        assert!(test.source.downloads().is_empty());
        assert!(test.threads.published().is_empty());
        assert!(test.store.writes().is_empty());
    }

    #[tokio::test]
    async fn recalled_document_gets_one_notice_and_one_record() {
        let recalled = doc(3, "Recalled - Doc 3 - Summons");
        let test = TestDependencies::new()
            .source(MockDocumentSource::new().with_documents(vec![recalled.clone()]));
        let work = tempfile::tempdir().unwrap();

        let report = Orchestrator::new(test.deps(), settings(work.path()))
            .run_cycle(&CancellationToken::new())
            .await;

        assert_eq!(report.recall_notices, 1);
        assert!(test.source.downloads().is_empty());

        let posts = test.threads.published_requests();
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].media_type, MediaType::Text);
        assert!(posts[0]
            .text
            .as_deref()
            .unwrap()
            .starts_with("Document recalled: Recalled - Doc 3 - Summons"));

        let writes = test.store.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].timestamp, recalled.published);
    }

    #[tokio::test]
    async fn failed_notice_leaves_recalled_document_unrecorded() {
        let test = TestDependencies::new()
            .source(MockDocumentSource::new().with_documents(vec![doc(4, "RECALLED - Doc 4")]))
            .threads(MockThreadsApi::failing());
        let work = tempfile::tempdir().unwrap();

        let report = Orchestrator::new(test.deps(), settings(work.path()))
            .run_cycle(&CancellationToken::new())
            .await;

        assert_eq!(report.failed, 1);
        assert!(test.store.writes().is_empty());
    }

    #[tokio::test]
    async fn new_documents_are_processed_and_recorded_once() {
        let docs = vec![doc(5, "Doc 5"), doc(6, "Doc 6"), doc(7, "Doc 7")];
        let test = TestDependencies::new()
            .source(MockDocumentSource::new().with_documents(docs))
            .store(MockStore::new().with_processed(&[doc(6, "Doc 6")]));
        let work = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(test.deps(), settings(work.path()));

        let first = orchestrator.run_cycle(&CancellationToken::new()).await;
        let second = orchestrator.run_cycle(&CancellationToken::new()).await;

        assert_eq!(first.dispatched, 2);
        assert_eq!(first.published, 2);
        assert_eq!(second.skipped, 3);
        assert_eq!(second.dispatched, 0);
        assert_eq!(test.store.writes().len(), 2);
        assert_eq!(test.threads.published().len(), 2);
        assert_eq!(orchestrator.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn store_outage_recovers_after_one_short_retry() {
        let test = TestDependencies::new()
            .source(MockDocumentSource::new().with_documents(vec![doc(8, "Doc 8")]))
            .store(MockStore::new().with_failing_checks(1));
        let work = tempfile::tempdir().unwrap();

        let report = Orchestrator::new(test.deps(), settings(work.path()))
            .run_cycle(&CancellationToken::new())
            .await;

        assert_eq!(test.store.reconnect_calls(), 1);
        assert_eq!(test.source.list_calls(), 1);
        assert_eq!(report.published, 1);
    }

    #[tokio::test]
    async fn connection_lost_mid_cycle_is_restored_before_lookups() {
        let docs = vec![doc(30, "Doc 30"), doc(31, "Doc 31"), doc(32, "Doc 32")];
        let test = TestDependencies::new()
            .source(MockDocumentSource::new().with_documents(docs.clone()))
            .store(
                MockStore::new()
                    .with_processed(&docs)
                    .with_connection_dropping_after(1),
            );
        let work = tempfile::tempdir().unwrap();

        let report = Orchestrator::new(test.deps(), settings(work.path()))
            .run_cycle(&CancellationToken::new())
            .await;

        assert_eq!(report.skipped, 3);
        assert_eq!(report.dispatched, 0);
        assert_eq!(test.store.reconnect_calls(), 1);
        assert!(test.source.downloads().is_empty());
        assert!(test.threads.published().is_empty());
    }

    #[tokio::test]
    async fn listing_failures_end_the_cycle_quietly() {
        let test = TestDependencies::new().source(
            MockDocumentSource::new()
                .with_listing(ListingResponse::FetchError("HTTP 503".to_string()))
                .with_listing(ListingResponse::NoDocuments),
        );
        let work = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(test.deps(), settings(work.path()));

        assert_eq!(orchestrator.run_cycle(&CancellationToken::new()).await, CycleReport::default());
        assert_eq!(orchestrator.run_cycle(&CancellationToken::new()).await, CycleReport::default());
        assert_eq!(test.source.list_calls(), 2);
    }

    #[tokio::test]
    async fn lookup_errors_fail_open() {
        let test = TestDependencies::new()
            .source(MockDocumentSource::new().with_documents(vec![doc(9, "Doc 9")]))
            .store(MockStore::new().with_failing_lookups());
        let work = tempfile::tempdir().unwrap();

        let report = Orchestrator::new(test.deps(), settings(work.path()))
            .run_cycle(&CancellationToken::new())
            .await;

        assert_eq!(report.dispatched, 1);
    }

    #[tokio::test]
    async fn concurrency_never_exceeds_the_permit_count() {
        let docs: Vec<Document> = (10..22).map(|n| doc(n, &format!("Doc {}", n))).collect();
        let test = TestDependencies::new()
            .source(MockDocumentSource::new().with_documents(docs))
            .summarizer(MockSummarizer::slow(Duration::from_millis(30)));
        let work = tempfile::tempdir().unwrap();
        let mut s = settings(work.path());
        s.documents_per_cycle = 12;
        s.max_concurrent = 3;
        let orchestrator = Arc::new(Orchestrator::new(test.deps(), s));

        let in_flight = orchestrator.in_flight();
        let peak = Arc::new(AtomicUsize::new(0));
        let sampler = {
            let peak = peak.clone();
            tokio::spawn(async move {
                loop {
                    peak.fetch_max(in_flight.load(Ordering::SeqCst), Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
        };

        let report = orchestrator.run_cycle(&CancellationToken::new()).await;
        sampler.abort();

        assert_eq!(report.published, 12);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn run_returns_after_cancellation() {
        let test = TestDependencies::new();
        let work = tempfile::tempdir().unwrap();
        let orchestrator = Orchestrator::new(test.deps(), settings(work.path()));
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        tokio::time::timeout(Duration::from_secs(2), orchestrator.run(cancel))
            .await
            .expect("poll loop should stop promptly");
        assert!(test.source.list_calls() >= 1);
    }
}

//! Processing of a single document, from download to the processed record.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{ProcessingError, StoreGuard};
use crate::domains::documents::Document;
use crate::domains::publishing::recall_notice;
use crate::domains::storage::ProcessedRecord;
use crate::kernel::BotDeps;

/// How a unit of work ended successfully.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Published { post_id: String },
    RecallNoticed,
}

/// Counts units currently running. Decrements on drop, so aborted units are
/// accounted for too.
pub struct InFlight {
    counter: Arc<AtomicUsize>,
}

impl InFlight {
    pub fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self {
            counter: counter.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Download, summarize, render and publish one document, then record it.
///
/// The scratch directory lives under `work_dir` and is removed however this
/// function exits.
pub async fn process_document(
    deps: &BotDeps,
    guard: &StoreGuard,
    doc: &Document,
    work_dir: &Path,
    summary_timeout: Duration,
    cancel: &CancellationToken,
) -> Result<Outcome, ProcessingError> {
    tokio::fs::create_dir_all(work_dir).await?;
    let scratch = tempfile::Builder::new()
        .prefix("doc-")
        .tempdir_in(work_dir)?;

    let pdf = match deps.source.download(doc, scratch.path()).await {
        Ok(path) => path,
        Err(e) if e.indicates_recall() => {
            info!(title = %doc.title, reason = %e, "Document unavailable, posting recall notice");
            publish_recall_notice(deps, guard, doc, cancel).await?;
            return Ok(Outcome::RecallNoticed);
        }
        Err(e) => return Err(ProcessingError::Download(e)),
    };
    debug!(title = %doc.title, path = %pdf.display(), "Document downloaded");

    let summary = match tokio::time::timeout(summary_timeout, deps.summarizer.summarize(&pdf)).await {
        Ok(Ok(summary)) => summary,
        Ok(Err(e)) => {
            warn!(title = %doc.title, error = %e, "Error generating summary, continuing without it");
            String::new()
        }
        Err(_) => {
            warn!(
                title = %doc.title,
                timeout_secs = summary_timeout.as_secs(),
                "Summary generation timed out, continuing without it"
            );
            String::new()
        }
    };

    let pages = deps
        .renderer
        .render(&pdf)
        .await
        .map_err(ProcessingError::Render)?;
    debug!(title = %doc.title, pages = pages.len(), "Document rendered");

    let post_id = deps
        .publisher
        .publish_document(pages, &doc.title, doc.published, &doc.url, &summary)
        .await?;
    info!(title = %doc.title, post_id = %post_id, "Document published");

    if !guard.ensure(cancel).await {
        return Err(ProcessingError::Cancelled);
    }
    deps.store
        .mark_processed(&ProcessedRecord::from(doc))
        .await?;

    Ok(Outcome::Published { post_id })
}

/// Post a text notice for a recalled document and record it once the notice
/// is out. A failed notice leaves the document unrecorded for the next cycle.
pub async fn publish_recall_notice(
    deps: &BotDeps,
    guard: &StoreGuard,
    doc: &Document,
    cancel: &CancellationToken,
) -> Result<(), ProcessingError> {
    let post_id = deps.publisher.publish_notice(&recall_notice(doc)).await?;
    info!(title = %doc.title, post_id = %post_id, "Recall notice published");

    if !guard.ensure(cancel).await {
        return Err(ProcessingError::Cancelled);
    }
    if let Err(e) = deps.store.mark_processed(&ProcessedRecord::from(doc)).await {
        // The notice is out; a duplicate notice next cycle beats crashing here
        error!(title = %doc.title, error = %e, "Failed to mark recalled document as processed");
    }
    Ok(())
}

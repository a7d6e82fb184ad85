//! Poll cycles against a real store, with every other port mocked.

mod common;

use bot_core::domains::pipeline::{Orchestrator, PipelineSettings};
use bot_core::domains::storage::DocumentStore;
use bot_core::kernel::test_dependencies::{
    DownloadFailure, MockDocumentSource, TestDependencies,
};
use bot_core::kernel::BotDeps;
use common::{document, TestHarness};
use std::sync::Arc;
use std::time::Duration;
use test_context::test_context;
use tokio_util::sync::CancellationToken;

fn settings(work_dir: &std::path::Path) -> PipelineSettings {
    PipelineSettings {
        poll_interval: Duration::from_millis(10),
        documents_per_cycle: 8,
        max_concurrent: 5,
        work_dir: work_dir.to_path_buf(),
        summary_timeout: Duration::from_millis(200),
        shutdown_grace: Duration::from_secs(1),
        store_retry_short: Duration::from_millis(5),
        store_retry_long: Duration::from_millis(10),
    }
}

#[test_context(TestHarness)]
#[tokio::test]
async fn documents_are_published_once_across_cycles(ctx: &mut TestHarness) {
    let docs = vec![
        document("Doc 1 - Entry List", 0),
        document("Recalled - Doc 2 - Summons", 1),
        document("Doc 3 - Decision", 2),
    ];
    let test = TestDependencies::new().source(
        MockDocumentSource::new()
            .with_documents(docs.clone())
            .with_download_failure("Doc 3 - Decision", DownloadFailure::InvalidArtifact),
    );
    let store: Arc<dyn DocumentStore> = Arc::new(ctx.store().await);
    let deps = BotDeps {
        store: store.clone(),
        ..test.deps()
    };
    let work = tempfile::tempdir().unwrap();
    let orchestrator = Orchestrator::new(deps, settings(work.path()));

    let first = orchestrator.run_cycle(&CancellationToken::new()).await;
    let second = orchestrator.run_cycle(&CancellationToken::new()).await;

    assert_eq!(first.published, 1);
    assert_eq!(first.recall_notices, 2);
    assert_eq!(second.skipped, 3);
    for doc in &docs {
        assert!(store.is_processed(doc).await, "{} not recorded", doc.title);
    }
    // One carousel and two text notices
    assert_eq!(test.threads.published().len(), 3);
    // The title-recalled document is never downloaded
    let mut downloads = test.source.downloads();
    downloads.sort();
    assert_eq!(downloads, vec!["Doc 1 - Entry List", "Doc 3 - Decision"]);
}

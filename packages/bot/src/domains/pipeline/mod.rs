//! Document pipeline - the poll loop and the per-document worker.

pub mod errors;
pub mod guard;
pub mod orchestrator;
pub mod worker;

pub use errors::ProcessingError;
pub use guard::StoreGuard;
pub use orchestrator::{CycleReport, Orchestrator, PipelineSettings};
pub use worker::{process_document, Outcome};

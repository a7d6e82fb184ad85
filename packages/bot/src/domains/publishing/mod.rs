pub mod errors;
pub mod format;
pub mod publisher;

pub use errors::PublishError;
pub use format::{format_post_text, recall_notice, truncate_text, MAX_POST_CHARS};
pub use publisher::{PublishTimings, Publisher, MAX_IMAGES};

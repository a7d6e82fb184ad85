//! Document source gateway - discovers decision documents on the listing page
//! and downloads them.
//!
//! - `models` - `Document` and `RenderedPage`
//! - `scraper` - listing parser, recall detection, validated downloads

pub mod errors;
pub mod models;
pub mod scraper;

pub use errors::SourceError;
pub use models::{Document, RenderedPage};
pub use scraper::{is_recalled, parse_listing, sanitize_filename, FiaScraper};

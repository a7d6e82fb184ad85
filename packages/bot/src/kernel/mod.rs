//! Kernel module - infrastructure adapters and dependencies.

pub mod ai;
pub mod deps;
pub mod picsur;
pub mod renderer;
pub mod shortener;
pub mod test_dependencies;
pub mod token;
pub mod traits;

pub use ai::OpenAiSummarizer;
pub use deps::{BotDeps, ThreadsAdapter};
pub use picsur::PicsurClient;
pub use renderer::ConversionServiceRenderer;
pub use shortener::ShortenerClient;
pub use test_dependencies::TestDependencies;
pub use token::{spawn_refresher, AccessToken, RefreshPolicy};
pub use traits::*;

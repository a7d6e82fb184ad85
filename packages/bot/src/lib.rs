// Decision document bot - core library
//
// Polls the FIA decision document listing, publishes new documents to Threads
// with an AI summary and page images, and records what has been handled so
// nothing is posted twice.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;

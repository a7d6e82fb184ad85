// Business domains
pub mod documents;
pub mod pipeline;
pub mod publishing;
pub mod storage;

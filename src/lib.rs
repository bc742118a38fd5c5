pub mod config;
pub mod data;
pub mod error;
pub mod models;
pub mod services;
pub mod state;

pub use config::IndexerConfig;
pub use error::AppError;
pub use services::indexing_service::{IndexObserver, IndexSummary, Indexer, NullObserver};

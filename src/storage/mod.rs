//! Storage module for database and configuration.

pub mod config;
pub mod database;
pub mod schema;
pub mod score_store;
pub mod summary_store;
pub mod transaction_store;

pub use config::{AppConfig, ConfigError};
pub use database::{Database, DatabaseError};
pub use score_store::{ScoreQuery, ScoreStore, SegmentBucket};
pub use summary_store::SummaryStore;
pub use transaction_store::TransactionStore;

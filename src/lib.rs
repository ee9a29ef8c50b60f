//! RFM Insights - Customer Segmentation Engine
//!
//! A self-hosted customer analytics engine built in Rust. Imports cleaned
//! retail transactions, rolls them into per-customer summaries, assigns
//! quartile Recency/Frequency/Monetary scores, and classifies each customer
//! into a named behavioral segment and churn-risk tier, with results
//! persisted per analysis date for historical comparison.

pub mod ingest;
pub mod rfm;
pub mod storage;

// Re-export commonly used types
pub use ingest::csv_import::CsvImporter;
pub use rfm::pipeline::{RfmPipeline, RunParams, RunSummary};
pub use rfm::segments::{ChurnRisk, Segment, SegmentClassifier};
pub use storage::database::{Database, DatabaseError};
pub use storage::score_store::ScoreQuery;

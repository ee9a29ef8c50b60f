//! RFM pipeline orchestration.
//!
//! One pipeline run rebuilds customer summaries from the cleaned
//! transaction stream, scores the eligible population, classifies each
//! customer, and upserts the resulting score rows — all inside a single
//! database transaction. A failure at any step rolls back every write from
//! the run, so re-invoking with the same parameters is always safe.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::rfm::aggregator::CustomerAggregator;
use crate::rfm::error::{RfmError, RfmResult};
use crate::rfm::quantile::{eligible_metrics, QuartileScorer};
use crate::rfm::segments::{ChurnRisk, Segment, SegmentClassifier};
use crate::storage::database::{Database, DatabaseError};
use crate::storage::score_store::ScoreStore;
use crate::storage::summary_store::SummaryStore;
use crate::storage::transaction_store::TransactionStore;

/// One scored, classified customer for a given analysis date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RfmScore {
    pub customer_id: String,
    /// The cutoff date this row was computed against.
    pub analysis_date: NaiveDate,
    pub recency_days: i64,
    pub frequency: u32,
    pub monetary: f64,
    pub recency_score: u8,
    pub frequency_score: u8,
    pub monetary_score: u8,
    /// Concatenated R/F/M digits, e.g. "443".
    pub rfm_combined: String,
    pub segment: Segment,
    pub churn_risk: ChurnRisk,
}

/// Parameters for one pipeline run.
#[derive(Debug, Clone, Copy)]
pub struct RunParams {
    /// Analysis cutoff date; recency is measured against this day.
    pub cutoff_date: NaiveDate,
    /// Lower bound on last purchase date (inclusive); absent = unbounded.
    pub start_date: Option<NaiveDate>,
    /// Upper bound on last purchase date (inclusive); absent = unbounded.
    pub end_date: Option<NaiveDate>,
}

impl RunParams {
    /// Run against a cutoff date with an unbounded purchase window.
    pub fn for_cutoff(cutoff_date: NaiveDate) -> Self {
        Self {
            cutoff_date,
            start_date: None,
            end_date: None,
        }
    }

    /// Restrict the eligible purchase window.
    pub fn with_window(mut self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        self.start_date = start;
        self.end_date = end;
        self
    }

    fn validate(&self) -> RfmResult<()> {
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(RfmError::InvalidInput(format!(
                    "start_date {} is after end_date {}",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of a pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub cutoff_date: NaiveDate,
    /// Customers scored in this run.
    pub customers_processed: usize,
    /// Customers per segment name.
    pub segment_counts: BTreeMap<String, usize>,
    /// Customers per churn-risk tier.
    pub risk_counts: BTreeMap<String, usize>,
}

/// Persisted record of one pipeline run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    pub id: Uuid,
    pub cutoff_date: NaiveDate,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub customers_processed: usize,
    pub segment_counts: BTreeMap<String, usize>,
    pub risk_counts: BTreeMap<String, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Orchestrates aggregate -> score -> classify -> persist as one unit.
pub struct RfmPipeline {
    aggregator: CustomerAggregator,
    scorer: QuartileScorer,
    classifier: SegmentClassifier,
}

impl RfmPipeline {
    /// Create a new pipeline.
    pub fn new() -> Self {
        Self {
            aggregator: CustomerAggregator::new(),
            scorer: QuartileScorer::new(),
            classifier: SegmentClassifier::new(),
        }
    }

    /// Execute a full recomputation run.
    ///
    /// All writes happen inside one transaction; any error leaves prior
    /// persisted state untouched and is surfaced to the caller unmodified.
    pub fn run(&self, db: &mut Database, params: &RunParams) -> RfmResult<RunSummary> {
        params.validate()?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        tracing::info!(
            run_id = %run_id,
            cutoff = %params.cutoff_date,
            "Starting RFM pipeline run"
        );

        let tx = db.transaction()?;
        let summary = self.run_steps(&tx, params, run_id, started_at)?;
        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(
            run_id = %run_id,
            customers = summary.customers_processed,
            segments = summary.segment_counts.len(),
            "RFM pipeline run complete"
        );
        Ok(summary)
    }

    fn run_steps(
        &self,
        tx: &rusqlite::Transaction<'_>,
        params: &RunParams,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> RfmResult<RunSummary> {
        // Step 1: rebuild customer summaries from the transaction stream.
        let transactions = TransactionStore::new(tx).load_clean()?;
        let summaries = self.aggregator.aggregate(&transactions);
        SummaryStore::new(tx).replace_all(&summaries)?;
        tracing::debug!(customers = summaries.len(), "Customer summaries rebuilt");

        // Step 2: score and classify the eligible population.
        let metrics = eligible_metrics(
            &summaries,
            params.cutoff_date,
            params.start_date,
            params.end_date,
        );
        let scored = self.scorer.score(&metrics);

        let scores: Vec<RfmScore> = scored
            .into_iter()
            .map(|s| {
                let (segment, churn_risk) =
                    self.classifier
                        .classify(s.recency_score, s.frequency_score, s.monetary_score);
                RfmScore {
                    customer_id: s.metrics.customer_id.clone(),
                    analysis_date: params.cutoff_date,
                    recency_days: s.metrics.recency_days,
                    frequency: s.metrics.frequency,
                    monetary: s.metrics.monetary,
                    recency_score: s.recency_score,
                    frequency_score: s.frequency_score,
                    monetary_score: s.monetary_score,
                    rfm_combined: s.combined(),
                    segment,
                    churn_risk,
                }
            })
            .collect();

        // Step 3: upsert score rows for this analysis date.
        let store = ScoreStore::new(tx);
        store.upsert_scores(&scores)?;

        // Step 4: record the run.
        let mut segment_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut risk_counts: BTreeMap<String, usize> = BTreeMap::new();
        for score in &scores {
            *segment_counts.entry(score.segment.name().to_string()).or_default() += 1;
            *risk_counts.entry(score.churn_risk.name().to_string()).or_default() += 1;
        }

        let run = PipelineRun {
            id: run_id,
            cutoff_date: params.cutoff_date,
            start_date: params.start_date,
            end_date: params.end_date,
            customers_processed: scores.len(),
            segment_counts: segment_counts.clone(),
            risk_counts: risk_counts.clone(),
            started_at,
            finished_at: Utc::now(),
        };
        store.insert_run(&run)?;

        Ok(RunSummary {
            run_id,
            cutoff_date: params.cutoff_date,
            customers_processed: scores.len(),
            segment_counts,
            risk_counts,
        })
    }
}

impl Default for RfmPipeline {
    fn default() -> Self {
        Self::new()
    }
}

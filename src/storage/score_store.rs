//! RFM score and pipeline-run storage operations.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use uuid::Uuid;

use crate::rfm::pipeline::{PipelineRun, RfmScore};
use crate::rfm::segments::{ChurnRisk, Segment};
use crate::storage::database::DatabaseError;

/// Date format used for analysis date columns.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Filter for reading scored customers.
#[derive(Debug, Clone)]
pub struct ScoreQuery {
    /// Analysis date to read (one snapshot per date).
    pub analysis_date: NaiveDate,
    /// Restrict to one segment.
    pub segment: Option<Segment>,
    /// Restrict to one churn-risk tier.
    pub churn_risk: Option<ChurnRisk>,
    /// Maximum rows returned.
    pub limit: u32,
}

impl ScoreQuery {
    /// Default row cap for read queries.
    pub const DEFAULT_LIMIT: u32 = 1000;

    /// Query one analysis date with no segment/risk filter.
    pub fn for_date(analysis_date: NaiveDate) -> Self {
        Self {
            analysis_date,
            segment: None,
            churn_risk: None,
            limit: Self::DEFAULT_LIMIT,
        }
    }

    /// Filter by segment.
    pub fn with_segment(mut self, segment: Segment) -> Self {
        self.segment = Some(segment);
        self
    }

    /// Filter by churn-risk tier.
    pub fn with_churn_risk(mut self, churn_risk: ChurnRisk) -> Self {
        self.churn_risk = Some(churn_risk);
        self
    }

    /// Cap the number of returned rows.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }
}

/// Per-segment rollup for one analysis date.
#[derive(Debug, Clone)]
pub struct SegmentBucket {
    pub segment: Segment,
    pub customers: usize,
    pub total_monetary: f64,
}

/// Store for RFM score rows and the pipeline run log.
pub struct ScoreStore<'a> {
    conn: &'a Connection,
}

impl<'a> ScoreStore<'a> {
    /// Create a new score store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    // ========== Score rows ==========

    /// Upsert score rows keyed by (customer_id, analysis_date).
    ///
    /// On conflict every derived field is overwritten and `updated_at`
    /// moves; `created_at` keeps the value from the first run.
    pub fn upsert_scores(&self, scores: &[RfmScore]) -> Result<usize, DatabaseError> {
        if scores.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();

        let mut stmt = self
            .conn
            .prepare(
                r#"
                INSERT INTO rfm_scores
                    (customer_id, analysis_date, recency_days, frequency, monetary,
                     recency_score, frequency_score, monetary_score, rfm_combined,
                     segment, churn_risk, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12)
                ON CONFLICT(customer_id, analysis_date) DO UPDATE SET
                    recency_days = excluded.recency_days,
                    frequency = excluded.frequency,
                    monetary = excluded.monetary,
                    recency_score = excluded.recency_score,
                    frequency_score = excluded.frequency_score,
                    monetary_score = excluded.monetary_score,
                    rfm_combined = excluded.rfm_combined,
                    segment = excluded.segment,
                    churn_risk = excluded.churn_risk,
                    updated_at = excluded.updated_at
                "#,
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        for score in scores {
            stmt.execute(params![
                score.customer_id,
                score.analysis_date.format(DATE_FORMAT).to_string(),
                score.recency_days,
                score.frequency,
                score.monetary,
                score.recency_score,
                score.frequency_score,
                score.monetary_score,
                score.rfm_combined,
                score.segment.name(),
                score.churn_risk.name(),
                now,
            ])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }

        Ok(scores.len())
    }

    /// Read scored customers, ordered by monetary value descending.
    pub fn query_scores(&self, query: &ScoreQuery) -> Result<Vec<RfmScore>, DatabaseError> {
        let mut sql = String::from(
            "SELECT customer_id, analysis_date, recency_days, frequency, monetary,
             recency_score, frequency_score, monetary_score, rfm_combined, segment, churn_risk
             FROM rfm_scores WHERE analysis_date = ?",
        );
        let mut values: Vec<Value> = vec![Value::from(
            query.analysis_date.format(DATE_FORMAT).to_string(),
        )];

        if let Some(segment) = query.segment {
            sql.push_str(" AND segment = ?");
            values.push(Value::from(segment.name().to_string()));
        }
        if let Some(churn_risk) = query.churn_risk {
            sql.push_str(" AND churn_risk = ?");
            values.push(Value::from(churn_risk.name().to_string()));
        }

        sql.push_str(" ORDER BY monetary DESC LIMIT ?");
        values.push(Value::from(query.limit as i64));

        let mut stmt = self
            .conn
            .prepare(&sql)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params_from_iter(values), map_score_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut scores = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            scores.push(row.into_score()?);
        }

        Ok(scores)
    }

    /// Get one customer's score for an analysis date.
    pub fn get_score(
        &self,
        customer_id: &str,
        analysis_date: NaiveDate,
    ) -> Result<Option<RfmScore>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT customer_id, analysis_date, recency_days, frequency, monetary,
                 recency_score, frequency_score, monetary_score, rfm_combined, segment, churn_risk
                 FROM rfm_scores WHERE customer_id = ?1 AND analysis_date = ?2",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let result = stmt.query_row(
            params![customer_id, analysis_date.format(DATE_FORMAT).to_string()],
            map_score_row,
        );

        match result {
            Ok(row) => Ok(Some(row.into_score()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Most recent analysis date with scores, the default "current" view.
    pub fn latest_analysis_date(&self) -> Result<Option<NaiveDate>, DatabaseError> {
        let latest: Option<String> = self
            .conn
            .query_row("SELECT MAX(analysis_date) FROM rfm_scores", [], |row| {
                row.get(0)
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        latest
            .map(|date_str| {
                NaiveDate::parse_from_str(&date_str, DATE_FORMAT).map_err(|e| {
                    DatabaseError::DeserializationError(format!("Invalid analysis date: {}", e))
                })
            })
            .transpose()
    }

    /// Customer count and total spend per segment for one analysis date.
    pub fn segment_distribution(
        &self,
        analysis_date: NaiveDate,
    ) -> Result<Vec<SegmentBucket>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT segment, COUNT(*), SUM(monetary) FROM rfm_scores
                 WHERE analysis_date = ?1
                 GROUP BY segment ORDER BY COUNT(*) DESC, segment",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(
                params![analysis_date.format(DATE_FORMAT).to_string()],
                |row| {
                    let segment: String = row.get(0)?;
                    let customers: i64 = row.get(1)?;
                    let total_monetary: f64 = row.get(2)?;
                    Ok((segment, customers, total_monetary))
                },
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut buckets = Vec::new();
        for row in rows {
            let (segment_str, customers, total_monetary) =
                row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            let segment = Segment::parse(&segment_str).ok_or_else(|| {
                DatabaseError::DeserializationError(format!("Unknown segment: {}", segment_str))
            })?;
            buckets.push(SegmentBucket {
                segment,
                customers: customers as usize,
                total_monetary,
            });
        }

        Ok(buckets)
    }

    // ========== Pipeline run log ==========

    /// Record a completed pipeline run.
    pub fn insert_run(&self, run: &PipelineRun) -> Result<(), DatabaseError> {
        let segment_counts_json = serde_json::to_string(&run.segment_counts)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;
        let risk_counts_json = serde_json::to_string(&run.risk_counts)
            .map_err(|e| DatabaseError::SerializationError(e.to_string()))?;

        self.conn
            .execute(
                "INSERT INTO pipeline_runs
                 (id, cutoff_date, start_date, end_date, customers_processed,
                  segment_counts_json, risk_counts_json, started_at, finished_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    run.id.to_string(),
                    run.cutoff_date.format(DATE_FORMAT).to_string(),
                    run.start_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    run.end_date.map(|d| d.format(DATE_FORMAT).to_string()),
                    run.customers_processed as i64,
                    segment_counts_json,
                    risk_counts_json,
                    run.started_at.to_rfc3339(),
                    run.finished_at.to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// List recorded runs, newest first.
    pub fn list_runs(&self, limit: u32) -> Result<Vec<PipelineRun>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, cutoff_date, start_date, end_date, customers_processed,
                 segment_counts_json, risk_counts_json, started_at, finished_at
                 FROM pipeline_runs ORDER BY started_at DESC LIMIT ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map(params![limit], |row| {
                Ok(RunRow {
                    id: row.get(0)?,
                    cutoff_date: row.get(1)?,
                    start_date: row.get(2)?,
                    end_date: row.get(3)?,
                    customers_processed: row.get(4)?,
                    segment_counts_json: row.get(5)?,
                    risk_counts_json: row.get(6)?,
                    started_at: row.get(7)?,
                    finished_at: row.get(8)?,
                })
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut runs = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            runs.push(row.into_run()?);
        }

        Ok(runs)
    }
}

fn map_score_row(row: &rusqlite::Row) -> rusqlite::Result<ScoreRow> {
    Ok(ScoreRow {
        customer_id: row.get(0)?,
        analysis_date: row.get(1)?,
        recency_days: row.get(2)?,
        frequency: row.get(3)?,
        monetary: row.get(4)?,
        recency_score: row.get(5)?,
        frequency_score: row.get(6)?,
        monetary_score: row.get(7)?,
        rfm_combined: row.get(8)?,
        segment: row.get(9)?,
        churn_risk: row.get(10)?,
    })
}

/// Intermediate struct for reading score rows from database.
struct ScoreRow {
    customer_id: String,
    analysis_date: String,
    recency_days: i64,
    frequency: u32,
    monetary: f64,
    recency_score: u8,
    frequency_score: u8,
    monetary_score: u8,
    rfm_combined: String,
    segment: String,
    churn_risk: String,
}

impl ScoreRow {
    fn into_score(self) -> Result<RfmScore, DatabaseError> {
        let analysis_date =
            NaiveDate::parse_from_str(&self.analysis_date, DATE_FORMAT).map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid analysis date: {}", e))
            })?;

        let segment = Segment::parse(&self.segment).ok_or_else(|| {
            DatabaseError::DeserializationError(format!("Unknown segment: {}", self.segment))
        })?;

        let churn_risk = ChurnRisk::parse(&self.churn_risk).ok_or_else(|| {
            DatabaseError::DeserializationError(format!("Unknown churn risk: {}", self.churn_risk))
        })?;

        Ok(RfmScore {
            customer_id: self.customer_id,
            analysis_date,
            recency_days: self.recency_days,
            frequency: self.frequency,
            monetary: self.monetary,
            recency_score: self.recency_score,
            frequency_score: self.frequency_score,
            monetary_score: self.monetary_score,
            rfm_combined: self.rfm_combined,
            segment,
            churn_risk,
        })
    }
}

/// Intermediate struct for reading run rows from database.
struct RunRow {
    id: String,
    cutoff_date: String,
    start_date: Option<String>,
    end_date: Option<String>,
    customers_processed: i64,
    segment_counts_json: String,
    risk_counts_json: String,
    started_at: String,
    finished_at: String,
}

impl RunRow {
    fn into_run(self) -> Result<PipelineRun, DatabaseError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| DatabaseError::DeserializationError(format!("Invalid UUID: {}", e)))?;

        let parse_date = |s: &str| {
            NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid date: {}", e))
            })
        };

        let cutoff_date = parse_date(&self.cutoff_date)?;
        let start_date = self.start_date.as_deref().map(parse_date).transpose()?;
        let end_date = self.end_date.as_deref().map(parse_date).transpose()?;

        let segment_counts = serde_json::from_str(&self.segment_counts_json)
            .map_err(|e| DatabaseError::DeserializationError(e.to_string()))?;
        let risk_counts = serde_json::from_str(&self.risk_counts_json)
            .map_err(|e| DatabaseError::DeserializationError(e.to_string()))?;

        let parse_ts = |s: &str| {
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    DatabaseError::DeserializationError(format!("Invalid timestamp: {}", e))
                })
        };

        Ok(PipelineRun {
            id,
            cutoff_date,
            start_date,
            end_date,
            customers_processed: self.customers_processed as usize,
            segment_counts,
            risk_counts,
            started_at: parse_ts(&self.started_at)?,
            finished_at: parse_ts(&self.finished_at)?,
        })
    }
}

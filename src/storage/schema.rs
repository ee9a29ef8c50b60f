//! Database schema definitions for RFM Insights.

/// SQL schema for creating all database tables.
pub const SCHEMA: &str = r#"
-- Cleaned transactions table (importer output)
CREATE TABLE IF NOT EXISTS clean_transactions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    customer_id TEXT,
    invoice_id TEXT NOT NULL,
    invoice_date TEXT,
    order_value REAL NOT NULL,
    country TEXT,
    quality TEXT NOT NULL DEFAULT 'clean',
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_clean_transactions_customer ON clean_transactions(customer_id);
CREATE INDEX IF NOT EXISTS idx_clean_transactions_quality ON clean_transactions(quality);

-- Customer summary table (one row per customer, rebuilt on each pipeline run)
CREATE TABLE IF NOT EXISTS customer_summary (
    customer_id TEXT PRIMARY KEY,
    first_purchase_date TEXT NOT NULL,
    last_purchase_date TEXT NOT NULL,
    total_orders INTEGER NOT NULL,
    total_spent REAL NOT NULL,
    avg_order_value REAL NOT NULL,
    country TEXT,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_customer_summary_last_purchase ON customer_summary(last_purchase_date);

-- RFM scores table (one row per customer per analysis date)
CREATE TABLE IF NOT EXISTS rfm_scores (
    customer_id TEXT NOT NULL,
    analysis_date TEXT NOT NULL,
    recency_days INTEGER NOT NULL,
    frequency INTEGER NOT NULL,
    monetary REAL NOT NULL,
    recency_score INTEGER NOT NULL,
    frequency_score INTEGER NOT NULL,
    monetary_score INTEGER NOT NULL,
    rfm_combined TEXT NOT NULL,
    segment TEXT NOT NULL,
    churn_risk TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (customer_id, analysis_date)
);

CREATE INDEX IF NOT EXISTS idx_rfm_scores_analysis_date ON rfm_scores(analysis_date);
CREATE INDEX IF NOT EXISTS idx_rfm_scores_segment ON rfm_scores(analysis_date, segment);
CREATE INDEX IF NOT EXISTS idx_rfm_scores_churn_risk ON rfm_scores(analysis_date, churn_risk);

-- Pipeline run log table
CREATE TABLE IF NOT EXISTS pipeline_runs (
    id TEXT PRIMARY KEY,
    cutoff_date TEXT NOT NULL,
    start_date TEXT,
    end_date TEXT,
    customers_processed INTEGER NOT NULL,
    segment_counts_json TEXT NOT NULL,
    risk_counts_json TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_pipeline_runs_cutoff ON pipeline_runs(cutoff_date);
"#;

/// SQL for schema version tracking (migrations)
pub const SCHEMA_VERSION_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);
"#;

/// Current schema version
pub const CURRENT_VERSION: i32 = 1;

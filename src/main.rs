//! RFM Insights - Customer Segmentation Engine
//!
//! Command-line entry point.

use std::path::PathBuf;

use anyhow::Context;
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use rfm_insights::ingest::csv_import::CsvImporter;
use rfm_insights::rfm::pipeline::{RfmPipeline, RunParams};
use rfm_insights::rfm::segments::{ChurnRisk, Segment};
use rfm_insights::storage::config;
use rfm_insights::storage::database::Database;
use rfm_insights::storage::score_store::{ScoreQuery, ScoreStore};

/// Customer RFM scoring and segmentation engine
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the SQLite database (defaults to the configured data dir)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a raw transaction CSV file
    Import {
        /// Path to the CSV file
        file: PathBuf,

        /// Rows per insert batch
        #[arg(long)]
        batch_size: Option<usize>,
    },

    /// Run the RFM pipeline
    Run {
        /// Analysis cutoff date (YYYY-MM-DD, default: today)
        #[arg(long)]
        cutoff: Option<NaiveDate>,

        /// Only consider customers whose last purchase is on or after this date
        #[arg(long)]
        start: Option<NaiveDate>,

        /// Only consider customers whose last purchase is on or before this date
        #[arg(long)]
        end: Option<NaiveDate>,
    },

    /// List scored customers, highest spend first
    Query {
        /// Analysis date (default: latest scored date)
        #[arg(long)]
        date: Option<NaiveDate>,

        /// Filter by segment name, e.g. "Champions"
        #[arg(long)]
        segment: Option<String>,

        /// Filter by churn-risk tier, e.g. "High Risk"
        #[arg(long)]
        risk: Option<String>,

        /// Maximum rows
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show the segment distribution for an analysis date
    Segments {
        /// Analysis date (default: latest scored date)
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let app_config = config::load_config().context("Failed to load configuration")?;
    let db_path = cli
        .database
        .clone()
        .unwrap_or_else(|| app_config.database_path());

    let mut db = Database::open(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;

    match cli.command {
        Command::Import { file, batch_size } => {
            let importer = match batch_size {
                Some(size) => CsvImporter::with_batch_size(size),
                None => CsvImporter::with_batch_size(app_config.import.batch_size),
            };
            let report = importer
                .import_file(&mut db, &file)
                .with_context(|| format!("Failed to import {}", file.display()))?;

            println!(
                "Imported {} rows ({} clean, {} flagged)",
                report.total_rows, report.clean_rows, report.flagged_rows
            );
        }

        Command::Run { cutoff, start, end } => {
            let cutoff = cutoff.unwrap_or_else(|| Local::now().date_naive());
            let params = RunParams::for_cutoff(cutoff).with_window(start, end);

            let summary = RfmPipeline::new().run(&mut db, &params)?;

            println!(
                "Processed {} customers (cutoff {})",
                summary.customers_processed, summary.cutoff_date
            );
            if !summary.segment_counts.is_empty() {
                println!("\nSegments:");
                for (segment, count) in &summary.segment_counts {
                    println!("  {:<22} {}", segment, count);
                }
                println!("\nChurn risk:");
                for (risk, count) in &summary.risk_counts {
                    println!("  {:<22} {}", risk, count);
                }
            }
        }

        Command::Query {
            date,
            segment,
            risk,
            limit,
        } => {
            let store = ScoreStore::new(db.connection());
            let date = resolve_date(&store, date)?;

            let mut query = ScoreQuery::for_date(date)
                .with_limit(limit.unwrap_or(app_config.query.default_limit));
            if let Some(name) = segment {
                let segment = Segment::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown segment: {}", name))?;
                query = query.with_segment(segment);
            }
            if let Some(name) = risk {
                let risk = ChurnRisk::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("Unknown churn risk: {}", name))?;
                query = query.with_churn_risk(risk);
            }

            let scores = store.query_scores(&query)?;
            println!(
                "{:<12} {:>8} {:>6} {:>12} {:>5} {:<20} {}",
                "customer", "recency", "freq", "monetary", "rfm", "segment", "churn risk"
            );
            for score in &scores {
                println!(
                    "{:<12} {:>8} {:>6} {:>12.2} {:>5} {:<20} {}",
                    score.customer_id,
                    score.recency_days,
                    score.frequency,
                    score.monetary,
                    score.rfm_combined,
                    score.segment,
                    score.churn_risk
                );
            }
            println!("\n{} customers (analysis date {})", scores.len(), date);
        }

        Command::Segments { date } => {
            let store = ScoreStore::new(db.connection());
            let date = resolve_date(&store, date)?;

            let buckets = store.segment_distribution(date)?;
            println!("{:<22} {:>9} {:>14}", "segment", "customers", "total spend");
            for bucket in &buckets {
                println!(
                    "{:<22} {:>9} {:>14.2}",
                    bucket.segment, bucket.customers, bucket.total_monetary
                );
            }
            println!("\nAnalysis date {}", date);
        }
    }

    Ok(())
}

/// Resolve an explicit analysis date, falling back to the latest scored one.
fn resolve_date(store: &ScoreStore, date: Option<NaiveDate>) -> anyhow::Result<NaiveDate> {
    match date {
        Some(date) => Ok(date),
        None => store
            .latest_analysis_date()?
            .ok_or_else(|| anyhow::anyhow!("No scores yet; run the pipeline first")),
    }
}

//! Integration tests for the complete RFM pipeline.
//!
//! Tests the end-to-end flow:
//! 1. Import a raw transaction CSV
//! 2. Rebuild customer summaries
//! 3. Score and classify the eligible population
//! 4. Query persisted results

use std::io::Write;

use chrono::NaiveDate;
use tempfile::NamedTempFile;

use rfm_insights::ingest::csv_import::CsvImporter;
use rfm_insights::rfm::pipeline::{RfmPipeline, RunParams};
use rfm_insights::rfm::segments::{ChurnRisk, Segment};
use rfm_insights::storage::database::Database;
use rfm_insights::storage::score_store::{ScoreQuery, ScoreStore};
use rfm_insights::storage::summary_store::SummaryStore;

fn cutoff() -> NaiveDate {
    NaiveDate::from_ymd_opt(2011, 12, 9).unwrap()
}

/// Eight single-order customers with spend 10..80, purchase dates spread
/// over the year so every metric has a full spread.
fn write_population_csv() -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "Invoice,StockCode,Description,Quantity,InvoiceDate,Price,Customer ID,Country"
    )
    .unwrap();

    let rows = [
        ("c01", "A01", "2011-01-15 10:00:00", 10.0),
        ("c02", "A02", "2011-03-15 10:00:00", 20.0),
        ("c03", "A03", "2011-05-15 10:00:00", 30.0),
        ("c04", "A04", "2011-07-15 10:00:00", 40.0),
        ("c05", "A05", "2011-09-15 10:00:00", 50.0),
        ("c06", "A06", "2011-10-15 10:00:00", 60.0),
        ("c07", "A07", "2011-11-15 10:00:00", 70.0),
        ("c08", "A08", "2011-12-05 10:00:00", 80.0),
    ];
    for (customer, invoice, date, price) in rows {
        writeln!(
            file,
            "{},SKU,ITEM,1,{},{:.2},{},United Kingdom",
            invoice, date, price, customer
        )
        .unwrap();
    }
    file
}

fn import_and_run(db: &mut Database, file: &NamedTempFile, params: &RunParams) {
    CsvImporter::new()
        .import_file(db, file.path())
        .expect("Import failed");
    RfmPipeline::new().run(db, params).expect("Pipeline failed");
}

#[test]
fn test_full_pipeline_scores_population() {
    let file = write_population_csv();
    let mut db = Database::open_in_memory().unwrap();
    let params = RunParams::for_cutoff(cutoff());

    CsvImporter::new()
        .import_file(&mut db, file.path())
        .expect("Import failed");
    let summary = RfmPipeline::new()
        .run(&mut db, &params)
        .expect("Pipeline failed");

    assert_eq!(summary.customers_processed, 8);
    assert_eq!(summary.segment_counts.values().sum::<usize>(), 8);

    let scores = ScoreStore::new(db.connection())
        .query_scores(&ScoreQuery::for_date(cutoff()))
        .unwrap();
    assert_eq!(scores.len(), 8);

    // Monetary quartiles: [10,20] -> 1, [30,40] -> 2, [50,60] -> 3, [70,80] -> 4
    for score in &scores {
        let expected = match score.monetary as u32 {
            10 | 20 => 1,
            30 | 40 => 2,
            50 | 60 => 3,
            _ => 4,
        };
        assert_eq!(score.monetary_score, expected, "customer {}", score.customer_id);
        assert_eq!(score.rfm_combined.len(), 3);
        assert!(score.rfm_combined.chars().all(|c| ('1'..='4').contains(&c)));
        assert!(score.recency_days >= 0);
    }

    // c08 is the most recent and biggest spender; all customers tie on one
    // order each, and the id tie-break hands c08 the top frequency slot too.
    let top = scores.iter().find(|s| s.customer_id == "c08").unwrap();
    assert_eq!(top.rfm_combined, "444");
    assert_eq!(top.segment, Segment::Champions);
    assert_eq!(top.churn_risk, ChurnRisk::NoRisk);

    // c01 is the oldest, smallest spender: hibernating, high churn risk
    let bottom = scores.iter().find(|s| s.customer_id == "c01").unwrap();
    assert_eq!(bottom.recency_score, 1);
    assert_eq!(bottom.monetary_score, 1);
    assert_eq!(bottom.segment, Segment::Hibernating);
    assert_eq!(bottom.churn_risk, ChurnRisk::HighRisk);
}

#[test]
fn test_rerun_is_idempotent() {
    let file = write_population_csv();
    let mut db = Database::open_in_memory().unwrap();
    let params = RunParams::for_cutoff(cutoff());

    import_and_run(&mut db, &file, &params);
    let first = ScoreStore::new(db.connection())
        .query_scores(&ScoreQuery::for_date(cutoff()))
        .unwrap();

    RfmPipeline::new().run(&mut db, &params).expect("Re-run failed");
    let second = ScoreStore::new(db.connection())
        .query_scores(&ScoreQuery::for_date(cutoff()))
        .unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_window_narrows_without_changing_formulas() {
    let file = write_population_csv();

    let mut full_db = Database::open_in_memory().unwrap();
    import_and_run(&mut full_db, &file, &RunParams::for_cutoff(cutoff()));
    let all = ScoreStore::new(full_db.connection())
        .query_scores(&ScoreQuery::for_date(cutoff()))
        .unwrap();
    assert_eq!(all.len(), 8);

    // Only customers whose last purchase falls in H2 2011
    let mut windowed_db = Database::open_in_memory().unwrap();
    let windowed = RunParams::for_cutoff(cutoff())
        .with_window(NaiveDate::from_ymd_opt(2011, 7, 1), None);
    CsvImporter::new()
        .import_file(&mut windowed_db, file.path())
        .expect("Import failed");
    let summary = RfmPipeline::new()
        .run(&mut windowed_db, &windowed)
        .expect("Windowed run failed");
    assert_eq!(summary.customers_processed, 5);

    let narrowed = ScoreStore::new(windowed_db.connection())
        .query_scores(&ScoreQuery::for_date(cutoff()))
        .unwrap();
    assert_eq!(narrowed.len(), 5);

    // Raw metrics are unchanged by the window; only the population (and
    // therefore the quartile boundaries) moved.
    let c08_before = all.iter().find(|s| s.customer_id == "c08").unwrap();
    let c08_after = narrowed.iter().find(|s| s.customer_id == "c08").unwrap();
    assert_eq!(c08_before.recency_days, c08_after.recency_days);
    assert_eq!(c08_before.frequency, c08_after.frequency);
    assert_eq!(c08_before.monetary, c08_after.monetary);
}

#[test]
fn test_historical_snapshots_coexist() {
    let file = write_population_csv();
    let mut db = Database::open_in_memory().unwrap();

    let november = NaiveDate::from_ymd_opt(2011, 11, 30).unwrap();
    import_and_run(&mut db, &file, &RunParams::for_cutoff(november));
    RfmPipeline::new()
        .run(&mut db, &RunParams::for_cutoff(cutoff()))
        .expect("Second run failed");

    let store = ScoreStore::new(db.connection());
    // c08 purchased on Dec 5: eligible only for the December cutoff
    let nov_scores = store.query_scores(&ScoreQuery::for_date(november)).unwrap();
    let dec_scores = store.query_scores(&ScoreQuery::for_date(cutoff())).unwrap();
    assert_eq!(nov_scores.len(), 7);
    assert_eq!(dec_scores.len(), 8);

    assert_eq!(store.latest_analysis_date().unwrap(), Some(cutoff()));

    // Same customer, two snapshots with different recency
    let c07_nov = nov_scores.iter().find(|s| s.customer_id == "c07").unwrap();
    let c07_dec = dec_scores.iter().find(|s| s.customer_id == "c07").unwrap();
    assert_eq!(c07_nov.recency_days, 15);
    assert_eq!(c07_dec.recency_days, 24);
}

#[test]
fn test_failed_run_rolls_back_all_writes() {
    let file = write_population_csv();
    let mut db = Database::open_in_memory().unwrap();

    CsvImporter::new()
        .import_file(&mut db, file.path())
        .expect("Import failed");

    // Sabotage the score table so the upsert step fails mid-run
    db.connection()
        .execute("DROP TABLE rfm_scores", [])
        .unwrap();

    let result = RfmPipeline::new().run(&mut db, &RunParams::for_cutoff(cutoff()));
    assert!(result.is_err());

    // The summary rebuild from the same run must have been rolled back
    assert_eq!(SummaryStore::new(db.connection()).count().unwrap(), 0);
}

#[test]
fn test_flagged_rows_never_reach_scoring() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "Invoice,StockCode,Description,Quantity,InvoiceDate,Price,Customer ID,Country"
    )
    .unwrap();
    // One good customer, one return-only customer, one anonymous row
    writeln!(file, "A01,SKU,ITEM,2,2011-12-01 10:00:00,25.00,9001,France").unwrap();
    writeln!(file, "C900,SKU,ITEM,-2,2011-12-02 10:00:00,25.00,9002,France").unwrap();
    writeln!(file, "A02,SKU,ITEM,1,2011-12-03 10:00:00,9.99,,France").unwrap();

    let mut db = Database::open_in_memory().unwrap();
    let report = CsvImporter::new()
        .import_file(&mut db, file.path())
        .expect("Import failed");
    assert_eq!(report.total_rows, 3);
    assert_eq!(report.clean_rows, 1);

    let summary = RfmPipeline::new()
        .run(&mut db, &RunParams::for_cutoff(cutoff()))
        .expect("Pipeline failed");
    assert_eq!(summary.customers_processed, 1);

    let scores = ScoreStore::new(db.connection())
        .query_scores(&ScoreQuery::for_date(cutoff()))
        .unwrap();
    assert_eq!(scores.len(), 1);
    assert_eq!(scores[0].customer_id, "9001");
    assert!((scores[0].monetary - 50.0).abs() < 1e-9);
}

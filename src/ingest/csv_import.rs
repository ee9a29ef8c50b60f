//! CSV import of raw retail transactions.
//!
//! Reads a retail export (both the `Invoice`/`Price`/`Customer ID` and the
//! older `InvoiceNo`/`UnitPrice`/`CustomerID` header vintages), cleans each
//! row, and stores it with a quality flag. The whole import runs inside a
//! single transaction, so a half-read file never leaves partial rows behind.

use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::ingest::transactions::{
    clean_field, normalize_customer_id, parse_invoice_date, CleanTransaction, QualityFlag,
};
use crate::storage::database::{Database, DatabaseError};
use crate::storage::transaction_store::TransactionStore;

/// Import errors.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),
}

/// Counters reported after an import.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportReport {
    /// Rows read from the file.
    pub total_rows: usize,
    /// Rows stored with quality flag `Clean`.
    pub clean_rows: usize,
    /// Rows stored with a defect flag.
    pub flagged_rows: usize,
}

/// One raw CSV record, as exported.
#[derive(Debug, Deserialize)]
struct RawRecord {
    #[serde(rename = "Invoice", alias = "InvoiceNo")]
    invoice: Option<String>,
    #[serde(rename = "Quantity")]
    quantity: Option<String>,
    #[serde(rename = "InvoiceDate")]
    invoice_date: Option<String>,
    #[serde(rename = "Price", alias = "UnitPrice")]
    price: Option<String>,
    #[serde(rename = "Customer ID", alias = "CustomerID")]
    customer_id: Option<String>,
    #[serde(rename = "Country")]
    country: Option<String>,
}

/// Imports raw transaction CSV files into the database.
pub struct CsvImporter {
    batch_size: usize,
}

impl CsvImporter {
    /// Create an importer with the default batch size.
    pub fn new() -> Self {
        Self { batch_size: 1000 }
    }

    /// Create an importer with a custom insert batch size.
    pub fn with_batch_size(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    /// Import a CSV file, replacing previously imported transactions.
    pub fn import_file(&self, db: &mut Database, path: &Path) -> Result<ImportReport, ImportError> {
        tracing::info!(path = %path.display(), "Importing transactions");

        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path)?;

        let tx = db.transaction()?;

        let mut report = ImportReport::default();
        {
            let store = TransactionStore::new(&tx);
            store.clear()?;

            let mut batch: Vec<CleanTransaction> = Vec::with_capacity(self.batch_size);
            for record in reader.deserialize() {
                let record: RawRecord = record?;
                let transaction = clean_record(record);

                report.total_rows += 1;
                if transaction.quality == QualityFlag::Clean {
                    report.clean_rows += 1;
                } else {
                    report.flagged_rows += 1;
                }

                batch.push(transaction);
                if batch.len() >= self.batch_size {
                    store.insert_batch(&batch)?;
                    tracing::debug!(rows = report.total_rows, "Imported rows");
                    batch.clear();
                }
            }
            store.insert_batch(&batch)?;
        }

        tx.commit()
            .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;

        tracing::info!(
            total = report.total_rows,
            clean = report.clean_rows,
            flagged = report.flagged_rows,
            "Import complete"
        );
        Ok(report)
    }
}

impl Default for CsvImporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Clean one raw record into a flagged transaction.
fn clean_record(record: RawRecord) -> CleanTransaction {
    let invoice_id = clean_field(record.invoice.as_deref()).unwrap_or_default();

    let quantity: i64 = clean_field(record.quantity.as_deref())
        .and_then(|q| q.parse::<f64>().ok())
        .map(|q| q.trunc() as i64)
        .unwrap_or(1);

    let price: f64 = clean_field(record.price.as_deref())
        .and_then(|p| p.parse::<f64>().ok())
        .unwrap_or(0.01);

    let customer_id =
        clean_field(record.customer_id.as_deref()).and_then(|id| normalize_customer_id(&id));

    let invoice_date =
        clean_field(record.invoice_date.as_deref()).and_then(|d| parse_invoice_date(&d));

    let country = clean_field(record.country.as_deref());

    CleanTransaction::from_parts(
        customer_id,
        invoice_id,
        invoice_date,
        quantity as f64 * price,
        country,
    )
}

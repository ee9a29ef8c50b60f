//! Cleaned transaction storage operations.

use chrono::{NaiveDateTime, Utc};
use rusqlite::{params, Connection};

use crate::ingest::transactions::{CleanTransaction, QualityFlag};
use crate::storage::database::DatabaseError;

/// Timestamp format used for invoice date columns.
const INVOICE_DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Store for cleaned transaction rows.
pub struct TransactionStore<'a> {
    conn: &'a Connection,
}

impl<'a> TransactionStore<'a> {
    /// Create a new transaction store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert a batch of cleaned transactions.
    ///
    /// Caller is responsible for wrapping the call in a transaction when
    /// importing multiple batches atomically.
    pub fn insert_batch(&self, transactions: &[CleanTransaction]) -> Result<usize, DatabaseError> {
        if transactions.is_empty() {
            return Ok(0);
        }

        let now = Utc::now().to_rfc3339();

        let mut stmt = self
            .conn
            .prepare(
                "INSERT INTO clean_transactions
                 (customer_id, invoice_id, invoice_date, order_value, country, quality, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        for tx in transactions {
            stmt.execute(params![
                tx.customer_id,
                tx.invoice_id,
                tx.invoice_date.map(|dt| dt.format(INVOICE_DATE_FORMAT).to_string()),
                tx.order_value,
                tx.country,
                tx.quality.as_str(),
                now,
            ])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
        }

        Ok(transactions.len())
    }

    /// Load all transactions with quality flag `Clean`.
    pub fn load_clean(&self) -> Result<Vec<CleanTransaction>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT customer_id, invoice_id, invoice_date, order_value, country, quality
                 FROM clean_transactions WHERE quality = 'clean' ORDER BY id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(TransactionRow {
                    customer_id: row.get(0)?,
                    invoice_id: row.get(1)?,
                    invoice_date: row.get(2)?,
                    order_value: row.get(3)?,
                    country: row.get(4)?,
                    quality: row.get(5)?,
                })
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut transactions = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            transactions.push(row.into_transaction()?);
        }

        Ok(transactions)
    }

    /// Count all stored transactions.
    pub fn count_all(&self) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM clean_transactions", [], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }

    /// Count transactions per quality flag.
    pub fn count_by_quality(&self) -> Result<Vec<(String, usize)>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT quality, COUNT(*) FROM clean_transactions
                 GROUP BY quality ORDER BY quality",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                let quality: String = row.get(0)?;
                let count: i64 = row.get(1)?;
                Ok((quality, count as usize))
            })
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut counts = Vec::new();
        for row in rows {
            counts.push(row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?);
        }

        Ok(counts)
    }

    /// Delete all stored transactions (used when re-importing a source file).
    pub fn clear(&self) -> Result<usize, DatabaseError> {
        self.conn
            .execute("DELETE FROM clean_transactions", [])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))
    }
}

/// Intermediate struct for reading transaction rows from database.
struct TransactionRow {
    customer_id: Option<String>,
    invoice_id: String,
    invoice_date: Option<String>,
    order_value: f64,
    country: Option<String>,
    quality: String,
}

impl TransactionRow {
    fn into_transaction(self) -> Result<CleanTransaction, DatabaseError> {
        let invoice_date = self
            .invoice_date
            .map(|s| NaiveDateTime::parse_from_str(&s, INVOICE_DATE_FORMAT))
            .transpose()
            .map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid invoice date: {}", e))
            })?;

        let quality = QualityFlag::parse(&self.quality).ok_or_else(|| {
            DatabaseError::DeserializationError(format!("Unknown quality flag: {}", self.quality))
        })?;

        Ok(CleanTransaction {
            customer_id: self.customer_id,
            invoice_id: self.invoice_id,
            invoice_date,
            order_value: self.order_value,
            country: self.country,
            quality,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::transactions::parse_invoice_date;
    use crate::storage::database::Database;

    fn sample_transaction(customer: &str, invoice: &str, value: f64) -> CleanTransaction {
        CleanTransaction::from_parts(
            Some(customer.to_string()),
            invoice.to_string(),
            parse_invoice_date("2011-11-20 10:15:00"),
            value,
            Some("United Kingdom".to_string()),
        )
    }

    #[test]
    fn test_insert_and_load_clean() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let store = TransactionStore::new(db.connection());

        let flagged = CleanTransaction::from_parts(
            None,
            "536370".to_string(),
            parse_invoice_date("2011-11-20 10:15:00"),
            9.90,
            None,
        );

        store
            .insert_batch(&[
                sample_transaction("17850", "536365", 15.30),
                sample_transaction("17850", "536366", 22.00),
                flagged,
            ])
            .expect("Failed to insert batch");

        assert_eq!(store.count_all().unwrap(), 3);

        let clean = store.load_clean().expect("Failed to load clean rows");
        assert_eq!(clean.len(), 2);
        assert!(clean.iter().all(|tx| tx.quality == QualityFlag::Clean));
        assert_eq!(clean[0].customer_id.as_deref(), Some("17850"));
        assert_eq!(
            clean[0].invoice_date,
            parse_invoice_date("2011-11-20 10:15:00")
        );
    }

    #[test]
    fn test_count_by_quality() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let store = TransactionStore::new(db.connection());

        store
            .insert_batch(&[
                sample_transaction("17850", "536365", 15.30),
                CleanTransaction::from_parts(
                    Some("17850".to_string()),
                    "C536379".to_string(),
                    parse_invoice_date("2011-11-21 09:00:00"),
                    -15.30,
                    None,
                ),
            ])
            .expect("Failed to insert batch");

        let counts = store.count_by_quality().expect("Failed to count");
        assert!(counts.contains(&("clean".to_string(), 1)));
        assert!(counts.contains(&("non_positive_value".to_string(), 1)));
    }

    #[test]
    fn test_clear() {
        let db = Database::open_in_memory().expect("Failed to create test database");
        let store = TransactionStore::new(db.connection());

        store
            .insert_batch(&[sample_transaction("17850", "536365", 15.30)])
            .expect("Failed to insert batch");
        assert_eq!(store.clear().unwrap(), 1);
        assert_eq!(store.count_all().unwrap(), 0);
    }
}

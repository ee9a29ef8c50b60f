//! Customer summary storage operations.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};

use crate::rfm::aggregator::CustomerSummary;
use crate::storage::database::DatabaseError;

/// Date format used for purchase date columns.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Store for per-customer summaries.
pub struct SummaryStore<'a> {
    conn: &'a Connection,
}

impl<'a> SummaryStore<'a> {
    /// Create a new summary store with the given connection.
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Replace the whole summary table with the given set (full rebuild).
    pub fn replace_all(&self, summaries: &[CustomerSummary]) -> Result<usize, DatabaseError> {
        self.conn
            .execute("DELETE FROM customer_summary", [])
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        for summary in summaries {
            self.upsert(summary)?;
        }

        Ok(summaries.len())
    }

    /// Insert or overwrite the summary for one customer.
    pub fn upsert(&self, summary: &CustomerSummary) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                r#"
                INSERT INTO customer_summary
                    (customer_id, first_purchase_date, last_purchase_date, total_orders,
                     total_spent, avg_order_value, country, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(customer_id) DO UPDATE SET
                    first_purchase_date = excluded.first_purchase_date,
                    last_purchase_date = excluded.last_purchase_date,
                    total_orders = excluded.total_orders,
                    total_spent = excluded.total_spent,
                    avg_order_value = excluded.avg_order_value,
                    country = excluded.country,
                    updated_at = excluded.updated_at
                "#,
                params![
                    summary.customer_id,
                    summary.first_purchase_date.format(DATE_FORMAT).to_string(),
                    summary.last_purchase_date.format(DATE_FORMAT).to_string(),
                    summary.total_orders,
                    summary.total_spent,
                    summary.avg_order_value,
                    summary.country,
                    summary.updated_at.to_rfc3339(),
                ],
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    /// Get the summary for one customer.
    pub fn get(&self, customer_id: &str) -> Result<Option<CustomerSummary>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT customer_id, first_purchase_date, last_purchase_date, total_orders,
                 total_spent, avg_order_value, country, updated_at
                 FROM customer_summary WHERE customer_id = ?1",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let result = stmt.query_row(params![customer_id], map_summary_row);

        match result {
            Ok(row) => Ok(Some(row.into_summary()?)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::QueryFailed(e.to_string())),
        }
    }

    /// Load all summaries, ordered by customer id.
    pub fn load_all(&self) -> Result<Vec<CustomerSummary>, DatabaseError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT customer_id, first_purchase_date, last_purchase_date, total_orders,
                 total_spent, avg_order_value, country, updated_at
                 FROM customer_summary ORDER BY customer_id",
            )
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let rows = stmt
            .query_map([], map_summary_row)
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        let mut summaries = Vec::new();
        for row in rows {
            let row = row.map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;
            summaries.push(row.into_summary()?);
        }

        Ok(summaries)
    }

    /// Count stored summaries.
    pub fn count(&self) -> Result<usize, DatabaseError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM customer_summary", [], |row| row.get(0))
            .map_err(|e| DatabaseError::QueryFailed(e.to_string()))?;

        Ok(count as usize)
    }
}

fn map_summary_row(row: &rusqlite::Row) -> rusqlite::Result<SummaryRow> {
    Ok(SummaryRow {
        customer_id: row.get(0)?,
        first_purchase_date: row.get(1)?,
        last_purchase_date: row.get(2)?,
        total_orders: row.get(3)?,
        total_spent: row.get(4)?,
        avg_order_value: row.get(5)?,
        country: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Intermediate struct for reading summary rows from database.
struct SummaryRow {
    customer_id: String,
    first_purchase_date: String,
    last_purchase_date: String,
    total_orders: u32,
    total_spent: f64,
    avg_order_value: f64,
    country: Option<String>,
    updated_at: String,
}

impl SummaryRow {
    fn into_summary(self) -> Result<CustomerSummary, DatabaseError> {
        let first_purchase_date = NaiveDate::parse_from_str(&self.first_purchase_date, DATE_FORMAT)
            .map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid first purchase date: {}", e))
            })?;

        let last_purchase_date = NaiveDate::parse_from_str(&self.last_purchase_date, DATE_FORMAT)
            .map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid last purchase date: {}", e))
            })?;

        let updated_at = DateTime::parse_from_rfc3339(&self.updated_at)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| {
                DatabaseError::DeserializationError(format!("Invalid updated_at: {}", e))
            })?;

        Ok(CustomerSummary {
            customer_id: self.customer_id,
            first_purchase_date,
            last_purchase_date,
            total_orders: self.total_orders,
            total_spent: self.total_spent,
            avg_order_value: self.avg_order_value,
            country: self.country,
            updated_at,
        })
    }
}

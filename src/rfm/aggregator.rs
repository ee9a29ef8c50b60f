//! Customer aggregation over the cleaned transaction stream.
//!
//! Rolls line-level transactions up into one [`CustomerSummary`] per
//! customer: purchase date range, distinct order count, total and average
//! spend. Only rows flagged `Clean` participate; rows without a customer id
//! are dropped entirely.

use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::transactions::{CleanTransaction, QualityFlag};

/// Per-customer purchase summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerSummary {
    /// Unique customer identifier.
    pub customer_id: String,
    /// Date of the earliest purchase.
    pub first_purchase_date: NaiveDate,
    /// Date of the most recent purchase.
    pub last_purchase_date: NaiveDate,
    /// Count of distinct invoice ids.
    pub total_orders: u32,
    /// Sum of order values.
    pub total_spent: f64,
    /// total_spent / total_orders.
    pub avg_order_value: f64,
    /// Country on record; lexicographically last when several appear.
    pub country: Option<String>,
    /// Last recomputation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Rolls cleaned transactions into per-customer summaries.
pub struct CustomerAggregator;

impl CustomerAggregator {
    /// Create a new aggregator.
    pub fn new() -> Self {
        Self
    }

    /// Aggregate a transaction slice into one summary per customer.
    ///
    /// Output is ordered by customer id, so repeated runs over the same
    /// input produce identical output regardless of input order.
    pub fn aggregate(&self, transactions: &[CleanTransaction]) -> Vec<CustomerSummary> {
        let mut accumulators: BTreeMap<&str, Accumulator<'_>> = BTreeMap::new();

        for tx in transactions {
            if tx.quality != QualityFlag::Clean {
                continue;
            }
            let Some(customer_id) = tx.customer_id.as_deref() else {
                continue;
            };
            if customer_id.is_empty() {
                continue;
            }
            let Some(day) = tx.invoice_day() else {
                continue;
            };

            let acc = accumulators.entry(customer_id).or_default();
            acc.first_purchase = Some(acc.first_purchase.map_or(day, |d| d.min(day)));
            acc.last_purchase = Some(acc.last_purchase.map_or(day, |d| d.max(day)));
            acc.invoices.insert(tx.invoice_id.as_str());
            acc.total_spent += tx.order_value;
            if let Some(country) = tx.country.as_deref() {
                match &acc.country {
                    Some(current) if current.as_str() >= country => {}
                    _ => acc.country = Some(country.to_string()),
                }
            }
        }

        let now = Utc::now();
        accumulators
            .into_iter()
            .filter_map(|(customer_id, acc)| acc.into_summary(customer_id, now))
            .collect()
    }
}

impl Default for CustomerAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Default)]
struct Accumulator<'a> {
    first_purchase: Option<NaiveDate>,
    last_purchase: Option<NaiveDate>,
    invoices: HashSet<&'a str>,
    total_spent: f64,
    country: Option<String>,
}

impl<'a> Accumulator<'a> {
    fn into_summary(self, customer_id: &str, now: DateTime<Utc>) -> Option<CustomerSummary> {
        let first_purchase_date = self.first_purchase?;
        let last_purchase_date = self.last_purchase?;
        let total_orders = self.invoices.len() as u32;
        if total_orders == 0 {
            return None;
        }

        Some(CustomerSummary {
            customer_id: customer_id.to_string(),
            first_purchase_date,
            last_purchase_date,
            total_orders,
            total_spent: self.total_spent,
            avg_order_value: self.total_spent / total_orders as f64,
            country: self.country,
            updated_at: now,
        })
    }
}

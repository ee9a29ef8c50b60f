//! Quartile scoring of customer RFM metrics.
//!
//! Implements NTILE(4) semantics over the eligible population: stable sort
//! by metric, partition into four contiguous ranks of as-equal-as-possible
//! size, map rank to a 1-4 score. Ties are broken by customer id so that
//! partition boundaries are deterministic across runs.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::aggregator::CustomerSummary;

/// Raw per-customer metrics entering quartile scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerMetrics {
    pub customer_id: String,
    /// Days between the last purchase and the analysis cutoff.
    pub recency_days: i64,
    /// Distinct order count.
    pub frequency: u32,
    /// Total spend.
    pub monetary: f64,
}

/// Metrics plus their assigned quartile scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredMetrics {
    pub metrics: CustomerMetrics,
    /// 4 = most recent quartile, 1 = least recent.
    pub recency_score: u8,
    /// 4 = most frequent quartile, 1 = least frequent.
    pub frequency_score: u8,
    /// 4 = highest-spend quartile, 1 = lowest.
    pub monetary_score: u8,
}

impl ScoredMetrics {
    /// Three-digit combined code, R then F then M (e.g. "443").
    pub fn combined(&self) -> String {
        format!(
            "{}{}{}",
            self.recency_score, self.frequency_score, self.monetary_score
        )
    }
}

/// Compute metrics for summaries passing the eligibility filter.
///
/// Excluded (silently, per the data-quality contract): blank customer ids,
/// non-positive order counts or spend, last purchases after the cutoff, and
/// last purchases outside the optional `[start, end]` window.
pub fn eligible_metrics(
    summaries: &[CustomerSummary],
    cutoff: NaiveDate,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Vec<CustomerMetrics> {
    summaries
        .iter()
        .filter(|s| !s.customer_id.is_empty())
        .filter(|s| s.total_orders > 0 && s.total_spent > 0.0)
        .filter(|s| s.last_purchase_date <= cutoff)
        .filter(|s| start.map_or(true, |d| s.last_purchase_date >= d))
        .filter(|s| end.map_or(true, |d| s.last_purchase_date <= d))
        .map(|s| CustomerMetrics {
            customer_id: s.customer_id.clone(),
            recency_days: (cutoff - s.last_purchase_date).num_days(),
            frequency: s.total_orders,
            monetary: s.total_spent,
        })
        .collect()
}

/// Assigns quartile scores across an eligible population.
pub struct QuartileScorer;

impl QuartileScorer {
    /// Create a new scorer.
    pub fn new() -> Self {
        Self
    }

    /// Score the population; output preserves input order.
    pub fn score(&self, metrics: &[CustomerMetrics]) -> Vec<ScoredMetrics> {
        let n = metrics.len();

        // Recency ranks ascending (rank 1 = most recent); the business
        // convention is higher score = better, so the rank is inverted.
        let recency = ranks_by(metrics, |a, b| {
            a.recency_days
                .cmp(&b.recency_days)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });

        // Frequency and monetary rank ascending, where rank 4 already is the
        // top quartile, so the rank is used directly.
        let frequency = ranks_by(metrics, |a, b| {
            a.frequency
                .cmp(&b.frequency)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });
        let monetary = ranks_by(metrics, |a, b| {
            a.monetary
                .total_cmp(&b.monetary)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });

        (0..n)
            .map(|i| ScoredMetrics {
                metrics: metrics[i].clone(),
                recency_score: 5 - recency[i],
                frequency_score: frequency[i],
                monetary_score: monetary[i],
            })
            .collect()
    }
}

impl Default for QuartileScorer {
    fn default() -> Self {
        Self::new()
    }
}

/// NTILE(4) rank per input position, under the given ordering.
fn ranks_by<F>(metrics: &[CustomerMetrics], compare: F) -> Vec<u8>
where
    F: Fn(&CustomerMetrics, &CustomerMetrics) -> std::cmp::Ordering,
{
    let n = metrics.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| compare(&metrics[a], &metrics[b]));

    let mut ranks = vec![0u8; n];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = ntile_rank(position, n);
    }
    ranks
}

/// Rank (1-4) of the element at `position` in a sorted population of `n`.
///
/// The first `n % 4` ranks hold `ceil(n / 4)` elements, the rest
/// `floor(n / 4)`.
fn ntile_rank(position: usize, n: usize) -> u8 {
    debug_assert!(position < n);
    let floor = n / 4;
    let extras = n % 4;
    let big = floor + 1;
    let boundary = extras * big;

    if position < boundary {
        (position / big) as u8 + 1
    } else {
        ((position - boundary) / floor.max(1)) as u8 + extras as u8 + 1
    }
}

//! Cleaned transaction records and field-level cleaning rules.
//!
//! Retail exports are messy: blank or `nan` cells, customer ids written as
//! floats (`17850.0`), and invoice dates in several regional formats. The
//! helpers here normalize raw CSV fields; [`CleanTransaction`] carries the
//! result together with a quality flag so that downstream aggregation can
//! filter on `Clean` without re-validating each field.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Invoice date formats accepted by the importer, tried in order.
pub const DATE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%m/%d/%Y %H:%M", "%d/%m/%Y %H:%M"];

/// Row-level data quality classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityFlag {
    /// All fields present and valid; participates in aggregation.
    Clean,
    /// Customer id missing or unparseable.
    MissingCustomer,
    /// Order value is zero or negative (returns, corrections).
    NonPositiveValue,
    /// Invoice date did not match any accepted format.
    UnparseableDate,
}

impl QualityFlag {
    /// Stable string form used in the database.
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityFlag::Clean => "clean",
            QualityFlag::MissingCustomer => "missing_customer",
            QualityFlag::NonPositiveValue => "non_positive_value",
            QualityFlag::UnparseableDate => "unparseable_date",
        }
    }

    /// Parse the database string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "clean" => Some(QualityFlag::Clean),
            "missing_customer" => Some(QualityFlag::MissingCustomer),
            "non_positive_value" => Some(QualityFlag::NonPositiveValue),
            "unparseable_date" => Some(QualityFlag::UnparseableDate),
            _ => None,
        }
    }
}

/// One cleaned transaction record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanTransaction {
    /// Normalized customer id; `None` when missing from the source row.
    pub customer_id: Option<String>,
    /// Invoice identifier (may be shared by several line items).
    pub invoice_id: String,
    /// Invoice timestamp; `None` only when `quality` is `UnparseableDate`.
    pub invoice_date: Option<NaiveDateTime>,
    /// Line value: quantity x unit price.
    pub order_value: f64,
    /// Country recorded on the row.
    pub country: Option<String>,
    /// Row quality classification.
    pub quality: QualityFlag,
}

impl CleanTransaction {
    /// Build a transaction from cleaned parts, deriving the quality flag.
    pub fn from_parts(
        customer_id: Option<String>,
        invoice_id: String,
        invoice_date: Option<NaiveDateTime>,
        order_value: f64,
        country: Option<String>,
    ) -> Self {
        let quality = if customer_id.is_none() {
            QualityFlag::MissingCustomer
        } else if invoice_date.is_none() {
            QualityFlag::UnparseableDate
        } else if order_value <= 0.0 {
            QualityFlag::NonPositiveValue
        } else {
            QualityFlag::Clean
        };

        Self {
            customer_id,
            invoice_id,
            invoice_date,
            order_value,
            country,
            quality,
        }
    }

    /// Calendar date of the invoice, when the timestamp parsed.
    pub fn invoice_day(&self) -> Option<NaiveDate> {
        self.invoice_date.map(|dt| dt.date())
    }
}

/// Trim a raw field; empty and `nan` cells become `None`.
pub fn clean_field(value: Option<&str>) -> Option<String> {
    let value = value?.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("nan") {
        return None;
    }
    Some(value.to_string())
}

/// Parse an invoice date against the accepted formats, in order.
pub fn parse_invoice_date(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Normalize a customer id from its source form.
///
/// Source files store customer ids as numbers, frequently with a float
/// suffix (`"17850.0"`). Non-numeric values are treated as missing.
pub fn normalize_customer_id(value: &str) -> Option<String> {
    let value = value.trim();
    let numeric: f64 = value.parse().ok()?;
    if !numeric.is_finite() || numeric < 0.0 {
        return None;
    }
    Some(format!("{}", numeric.trunc() as i64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_field_strips_blank_and_nan() {
        assert_eq!(clean_field(Some("  United Kingdom ")), Some("United Kingdom".to_string()));
        assert_eq!(clean_field(Some("")), None);
        assert_eq!(clean_field(Some("   ")), None);
        assert_eq!(clean_field(Some("nan")), None);
        assert_eq!(clean_field(Some("NaN")), None);
        assert_eq!(clean_field(None), None);
    }

    #[test]
    fn test_parse_invoice_date_formats() {
        let iso = parse_invoice_date("2011-12-09 12:50:00").unwrap();
        assert_eq!(iso.date(), NaiveDate::from_ymd_opt(2011, 12, 9).unwrap());

        // US-style month first
        let us = parse_invoice_date("12/9/2011 12:50").unwrap();
        assert_eq!(us.date(), NaiveDate::from_ymd_opt(2011, 12, 9).unwrap());

        assert!(parse_invoice_date("ninth of december").is_none());
    }

    #[test]
    fn test_normalize_customer_id() {
        assert_eq!(normalize_customer_id("17850"), Some("17850".to_string()));
        assert_eq!(normalize_customer_id("17850.0"), Some("17850".to_string()));
        assert_eq!(normalize_customer_id(" 13047.0 "), Some("13047".to_string()));
        assert_eq!(normalize_customer_id("C-12"), None);
        assert_eq!(normalize_customer_id(""), None);
    }

    #[test]
    fn test_quality_flag_precedence() {
        let date = parse_invoice_date("2011-12-09 12:50:00");

        let clean = CleanTransaction::from_parts(
            Some("17850".into()),
            "536365".into(),
            date,
            15.30,
            Some("United Kingdom".into()),
        );
        assert_eq!(clean.quality, QualityFlag::Clean);

        // Missing customer wins over any other defect
        let missing =
            CleanTransaction::from_parts(None, "536365".into(), None, -5.0, None);
        assert_eq!(missing.quality, QualityFlag::MissingCustomer);

        let bad_date = CleanTransaction::from_parts(
            Some("17850".into()),
            "536365".into(),
            None,
            15.30,
            None,
        );
        assert_eq!(bad_date.quality, QualityFlag::UnparseableDate);

        // Returns carry negative line values
        let negative = CleanTransaction::from_parts(
            Some("17850".into()),
            "C536365".into(),
            date,
            -15.30,
            None,
        );
        assert_eq!(negative.quality, QualityFlag::NonPositiveValue);
    }

    #[test]
    fn test_quality_flag_round_trip() {
        for flag in [
            QualityFlag::Clean,
            QualityFlag::MissingCustomer,
            QualityFlag::NonPositiveValue,
            QualityFlag::UnparseableDate,
        ] {
            assert_eq!(QualityFlag::parse(flag.as_str()), Some(flag));
        }
        assert_eq!(QualityFlag::parse("bogus"), None);
    }
}

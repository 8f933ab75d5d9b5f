//! Scalar parsing and rendering for the value shapes found in trip records.

use std::str::FromStr;

use anyhow::{Result, anyhow};
use chrono::NaiveDateTime;
use rust_decimal::Decimal;

use crate::schema::ColumnType;

/// Timestamp layouts the sink accepts without a `DateStyle` hint.
const TIMESTAMP_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Empty or whitespace-only fields are nulls.
pub fn is_null(value: &str) -> bool {
    value.trim().is_empty()
}

pub fn parse_integer(value: &str) -> Option<i64> {
    value.trim().parse::<i64>().ok()
}

pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let trimmed = value.trim();
    Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .ok()
}

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    for fmt in TIMESTAMP_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{trimmed}' as timestamp"))
}

/// Renders a non-null field for a column of type `ty`.
///
/// Decimal columns always carry a fractional part so a whole number reads as
/// a decimal (`7` becomes `7.0`); every other type is written as-is after
/// trimming. Returns an error when the value does not fit the column type.
pub fn render_value(value: &str, ty: ColumnType) -> Result<String> {
    let trimmed = value.trim();
    match ty {
        ColumnType::Integer => parse_integer(trimmed)
            .map(|_| trimmed.to_string())
            .ok_or_else(|| anyhow!("'{trimmed}' is not an integer")),
        ColumnType::Decimal => {
            let mut decimal =
                parse_decimal(trimmed).ok_or_else(|| anyhow!("'{trimmed}' is not a decimal"))?;
            if decimal.scale() == 0 {
                decimal.rescale(1);
            }
            Ok(decimal.to_string())
        }
        ColumnType::Timestamp => parse_timestamp(trimmed).map(|_| trimmed.to_string()),
        ColumnType::Text => Ok(trimmed.to_string()),
    }
}

use crate::error::CanonError;
use crate::format::InputFormat;

/// Converts a validated raw result into a comparable number.
///
/// Times become total seconds. Callers validate first; the conversion is
/// still total and reports anything it cannot read.
pub fn canonicalize(raw: &str, format: InputFormat) -> Result<f64, CanonError> {
    let t = raw.trim();
    match format {
        InputFormat::Time => time_to_seconds(t),
        InputFormat::Count => t
            .parse::<i64>()
            .map(|n| n as f64)
            .map_err(|_| CanonError::InvalidCount(t.to_string())),
        InputFormat::Seconds | InputFormat::Decimal => parse_decimal(t),
    }
}

pub fn time_to_seconds(s: &str) -> Result<f64, CanonError> {
    let parts: Vec<&str> = s.trim().split(':').collect();
    if parts.len() != 2 {
        return Err(CanonError::InvalidTimeFormat(s.to_string()));
    }
    let minutes: i64 = parts[0]
        .trim()
        .parse()
        .map_err(|_| CanonError::InvalidTimeFormat(s.to_string()))?;
    let seconds: i64 = parts[1]
        .trim()
        .parse()
        .map_err(|_| CanonError::InvalidTimeFormat(s.to_string()))?;
    let total = total_seconds(minutes, seconds)
        .ok_or_else(|| CanonError::InvalidTimeFormat(s.to_string()))?;
    Ok(total as f64)
}

/// `minutes * 60 + seconds`, or `None` when it does not fit in an `i64`.
pub(crate) fn total_seconds(minutes: i64, seconds: i64) -> Option<i64> {
    minutes.checked_mul(60)?.checked_add(seconds)
}

fn parse_decimal(s: &str) -> Result<f64, CanonError> {
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CanonError::InvalidNumber(s.to_string())),
    }
}

/// Reads a benchmark cell for comparison against a canonical student value.
///
/// Time cells go through the time conversion; every other format is read as
/// a decimal so tables may carry fractional thresholds for count tests.
/// Blank, unreadable and non-positive cells are gaps and yield `None`.
pub fn parse_benchmark_cell(cell: &str, format: InputFormat) -> Option<f64> {
    let t = cell.trim();
    if t.is_empty() {
        return None;
    }
    let v = match format {
        InputFormat::Time => time_to_seconds(t).ok()?,
        _ => parse_decimal(t).ok()?,
    };
    if v <= 0.0 {
        return None;
    }
    Some(v)
}

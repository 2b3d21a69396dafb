//! Weighted composite grade across several tests.
//!
//! Weights are checked before anything is graded. A test whose benchmark
//! data cannot be used drops out of the denominator instead of counting as
//! zero, so the remaining tests are renormalized.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{info, warn};

use crate::benchmark::{normalize, DemographicKey};
use crate::canon::canonicalize;
use crate::error::{ConfigError, FieldError, GradingError, LookupError};
use crate::format::InputFormat;
use crate::model::WeightEntry;
use crate::session::GradingSession;
use crate::source::DataSource;
use crate::strategy::threshold_scan;
use crate::validate::validate;

pub const WEIGHT_SUM_TOLERANCE: f64 = 0.001;
// Keeps floor() from dropping a whole point when an exact integer average
// comes out a hair below itself in binary.
const FLOOR_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestOutcome {
    pub test_type: String,
    pub label: String,
    pub weight: f64,
    pub final_score: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResult {
    pub final_grade: i64,
    pub used_weight: f64,
    pub total_weight: f64,
    pub tests: Vec<TestOutcome>,
}

/// Positive-weight entries that apply to `gender`, in table order. A
/// gender-specific entry replaces a generic one for the same test; two
/// entries for the same test and gender are a configuration error.
pub fn applicable_weights(
    entries: &[WeightEntry],
    gender: &str,
) -> Result<Vec<WeightEntry>, ConfigError> {
    let gender = normalize(gender);
    let mut out: Vec<WeightEntry> = Vec::new();
    for e in entries {
        if e.weight_percent <= 0.0 {
            continue;
        }
        match e.gender.as_deref() {
            Some(g) if g != gender => continue,
            _ => {}
        }
        match out.iter_mut().find(|w| w.test_type == e.test_type) {
            Some(existing) if existing.gender == e.gender => {
                return Err(ConfigError::DuplicateWeight {
                    test_type: e.test_type.clone(),
                });
            }
            Some(existing) => {
                if existing.gender.is_none() {
                    *existing = e.clone();
                }
            }
            None => out.push(e.clone()),
        }
    }
    Ok(out)
}

pub fn check_weight_sum(weights: &[WeightEntry], gender: &str) -> Result<f64, ConfigError> {
    if weights.is_empty() {
        return Err(ConfigError::NoWeightedTests {
            gender: normalize(gender),
        });
    }
    let total: f64 = weights.iter().map(|w| w.weight_percent).sum();
    if (total - 100.0).abs() > WEIGHT_SUM_TOLERANCE {
        return Err(ConfigError::WeightSumMismatch { actual: total });
    }
    Ok(total)
}

pub fn load_weights(source: &dyn DataSource) -> Result<Vec<WeightEntry>, GradingError> {
    let mut entries = Vec::new();
    for rec in source.weight_entries()? {
        if let Some(entry) = WeightEntry::from_record(&rec)? {
            entries.push(entry);
        }
    }
    Ok(entries)
}

/// `floor(sum(score * weight) / sum(weight))` over the graded tests.
pub fn combine(tests: Vec<TestOutcome>, total_weight: f64) -> Result<CompositeResult, GradingError> {
    let mut weighted_sum = 0.0_f64;
    let mut used_weight = 0.0_f64;
    for t in &tests {
        if let Some(score) = t.final_score {
            weighted_sum += score as f64 * t.weight;
            used_weight += t.weight;
        }
    }
    if used_weight <= 0.0 {
        return Err(GradingError::NoGradableTests);
    }
    let final_grade = (weighted_sum / used_weight + FLOOR_EPSILON).floor() as i64;
    Ok(CompositeResult {
        final_grade,
        used_weight,
        total_weight,
        tests,
    })
}

pub fn grade_composite(
    session: &mut GradingSession,
    source: &dyn DataSource,
    inputs: &HashMap<String, String>,
    key: &DemographicKey,
) -> Result<CompositeResult, GradingError> {
    let entries = load_weights(source)?;
    let weights = applicable_weights(&entries, key.gender())?;
    let total_weight = check_weight_sum(&weights, key.gender())?;

    let policy = session.config().count_policy;
    let mut formats: Vec<InputFormat> = Vec::with_capacity(weights.len());
    let mut field_errors: Vec<FieldError> = Vec::new();
    for w in &weights {
        let format = match session.definition(source, &w.test_type)? {
            Some(def) => match def.format() {
                Ok(f) => f,
                Err(error) => {
                    field_errors.push(FieldError {
                        test_type: w.test_type.clone(),
                        error,
                    });
                    continue;
                }
            },
            None => {
                warn!(test_type = %w.test_type, "weighted test has no definition, reading input as count");
                InputFormat::Count
            }
        };
        let raw = inputs.get(&w.test_type).map(String::as_str).unwrap_or("");
        if let Err(error) = validate(raw, format, policy) {
            field_errors.push(FieldError {
                test_type: w.test_type.clone(),
                error,
            });
        }
        formats.push(format);
    }
    if !field_errors.is_empty() {
        return Err(GradingError::InvalidInputs(field_errors));
    }

    session.preload(source, weights.iter().map(|w| w.test_type.as_str()))?;

    let mut tests: Vec<TestOutcome> = Vec::with_capacity(weights.len());
    for (w, format) in weights.iter().zip(formats) {
        let raw = inputs.get(&w.test_type).map(String::as_str).unwrap_or("");
        let value = canonicalize(raw, format)?;
        let graded = session.table(source, &w.test_type).and_then(|table| {
            let column = table.resolve_column(key)?;
            Ok(threshold_scan(value, &table, &column, format))
        });
        let (final_score, excluded_reason) = match graded {
            Ok(score) => (Some(score), None),
            Err(GradingError::Lookup(e)) => {
                warn!(test_type = %w.test_type, error = %e, "excluding test from composite");
                (None, Some(exclusion_reason(&e)))
            }
            Err(other) => return Err(other),
        };
        tests.push(TestOutcome {
            test_type: w.test_type.clone(),
            label: w.label.clone(),
            weight: w.weight_percent,
            final_score,
            excluded_reason,
        });
    }

    let result = combine(tests, total_weight)?;
    info!(
        gender = key.gender(),
        grade = key.grade(),
        final_grade = result.final_grade,
        used_weight = result.used_weight,
        "graded composite"
    );
    Ok(result)
}

fn exclusion_reason(e: &LookupError) -> String {
    format!("{}: {}", e.code(), e)
}

//! Error taxonomy of the grading engine.
//!
//! Validation errors are recoverable per field. Lookup errors are fatal for a
//! single test but only exclude the test from a composite. Config errors block
//! a composite before any test is graded. `DataUnavailable` means the data
//! source itself failed and is never cached.

use serde_json::json;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("enter a result")]
    EmptyInput,
    #[error("time must be minutes:seconds, e.g. 8:30")]
    MalformedTime,
    #[error("seconds must be between 0 and 59")]
    OutOfRangeTime,
    #[error("time must be greater than zero")]
    ZeroTime,
    #[error("enter a whole number, e.g. 20")]
    MalformedCount,
    #[error("count is below the allowed minimum")]
    NegativeOrZeroCount,
    #[error("enter a positive number, e.g. 12.5")]
    MalformedDecimal,
    #[error("number must be greater than zero")]
    NonPositiveDecimal,
    #[error("unknown input format: {0}")]
    UnknownFormat(String),
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EmptyInput => "emptyInput",
            Self::MalformedTime => "malformedTime",
            Self::OutOfRangeTime => "outOfRangeTime",
            Self::ZeroTime => "zeroTime",
            Self::MalformedCount => "malformedCount",
            Self::NegativeOrZeroCount => "negativeOrZeroCount",
            Self::MalformedDecimal => "malformedDecimal",
            Self::NonPositiveDecimal => "nonPositiveDecimal",
            Self::UnknownFormat(_) => "unknownFormat",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CanonError {
    #[error("invalid time format: {0:?}")]
    InvalidTimeFormat(String),
    #[error("invalid count: {0:?}")]
    InvalidCount(String),
    #[error("invalid number: {0:?}")]
    InvalidNumber(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("unknown test type: {0}")]
    UnknownTest(String),
    #[error("no benchmark data for test {test_type}")]
    NoBenchmarkData { test_type: String },
    #[error("benchmark table for {test_type} has no column {column}")]
    MissingColumn { test_type: String, column: String },
    #[error("benchmark table for {test_type} is malformed: {reason}")]
    MalformedTable { test_type: String, reason: String },
    #[error("top and bottom benchmarks are both {value}")]
    DegenerateBenchmark { value: f64 },
}

impl LookupError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTest(_) => "unknown_test",
            Self::NoBenchmarkData { .. } => "no_benchmark_data",
            Self::MissingColumn { .. } => "missing_column",
            Self::MalformedTable { .. } => "malformed_table",
            Self::DegenerateBenchmark { .. } => "degenerate_benchmark",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no weighted tests defined for gender {gender}")]
    NoWeightedTests { gender: String },
    #[error("weights must sum to 100%, got {actual}")]
    WeightSumMismatch { actual: f64 },
    #[error("weight for {test_type} is not a number: {raw:?}")]
    InvalidWeight { test_type: String, raw: String },
    #[error("test {test_type} has more than one weight row for the same gender")]
    DuplicateWeight { test_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("data source unavailable: {0}")]
pub struct DataUnavailable(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub test_type: String,
    pub error: ValidationError,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GradingError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Canon(#[from] CanonError),
    #[error(transparent)]
    Lookup(#[from] LookupError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    DataUnavailable(#[from] DataUnavailable),
    #[error("{} input(s) failed validation", .0.len())]
    InvalidInputs(Vec<FieldError>),
    #[error("no test could be graded: every weighted test lacks benchmark data")]
    NoGradableTests,
}

impl GradingError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) | Self::Canon(_) | Self::InvalidInputs(_) => "validation_failed",
            Self::Lookup(e) => e.code(),
            Self::Config(_) => "config_error",
            Self::DataUnavailable(_) => "data_unavailable",
            Self::NoGradableTests => "no_gradable_tests",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Validation(e) => Some(json!({ "kind": e.kind() })),
            Self::InvalidInputs(fields) => Some(json!({
                "fields": fields
                    .iter()
                    .map(|f| json!({
                        "testType": f.test_type,
                        "kind": f.error.kind(),
                        "message": f.error.to_string(),
                    }))
                    .collect::<Vec<_>>()
            })),
            Self::Config(ConfigError::WeightSumMismatch { actual }) => {
                Some(json!({ "actualWeightSum": actual }))
            }
            Self::Config(ConfigError::DuplicateWeight { test_type }) => {
                Some(json!({ "testType": test_type }))
            }
            Self::Lookup(LookupError::MissingColumn { test_type, column }) => {
                Some(json!({ "testType": test_type, "column": column }))
            }
            _ => None,
        }
    }
}

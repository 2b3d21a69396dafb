use serde::Serialize;

use crate::benchmark::normalize;
use crate::error::{ConfigError, ValidationError};
use crate::format::InputFormat;
use crate::source::{record_get_any, Record};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    pub test_type: String,
    pub title: String,
    pub description: String,
    /// Kept as supplied so an unrecognised format surfaces at validation time.
    pub input_format: String,
}

impl TestDefinition {
    /// Accepts both the fields-table headers (`value`, `label`) and the
    /// options-table aliases (`test_type`, `title`).
    pub fn from_record(rec: &Record) -> Option<Self> {
        let test_type = record_get_any(rec, &["value", "test_type"])?.trim().to_string();
        let title = record_get_any(rec, &["label", "title"])
            .unwrap_or(test_type.as_str())
            .trim()
            .to_string();
        Some(Self {
            title,
            description: record_get_any(rec, &["description"])
                .unwrap_or("")
                .trim()
                .to_string(),
            input_format: record_get_any(rec, &["input_format"])
                .unwrap_or("")
                .trim()
                .to_string(),
            test_type,
        })
    }

    pub fn format(&self) -> Result<InputFormat, ValidationError> {
        self.input_format.parse()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeightEntry {
    pub test_type: String,
    /// `None` applies to every gender.
    pub gender: Option<String>,
    pub weight_percent: f64,
    pub label: String,
}

impl WeightEntry {
    /// Rows without a test type are skipped. A blank weight counts as zero.
    pub fn from_record(rec: &Record) -> Result<Option<Self>, ConfigError> {
        let Some(test_type) = record_get_any(rec, &["test_type", "value", "testtype"]) else {
            return Ok(None);
        };
        let test_type = test_type.trim().to_string();
        let raw = record_get_any(rec, &["weight_percent", "weight"]).unwrap_or("0");
        let weight_percent: f64 = raw.trim().parse().map_err(|_| ConfigError::InvalidWeight {
            test_type: test_type.clone(),
            raw: raw.to_string(),
        })?;
        if !weight_percent.is_finite() {
            return Err(ConfigError::InvalidWeight {
                test_type,
                raw: raw.to_string(),
            });
        }
        let gender = record_get_any(rec, &["gender"]).map(normalize);
        Ok(Some(Self {
            label: record_get_any(rec, &["label"])
                .unwrap_or(test_type.as_str())
                .trim()
                .to_string(),
            test_type,
            gender,
            weight_percent,
        }))
    }
}

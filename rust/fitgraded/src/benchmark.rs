//! Benchmark data shapes.
//!
//! A test is graded either against a pair of endpoints per demographic
//! (interpolation) or against an ordered table of thresholds with one column
//! per demographic (threshold scan). Both are built from string records and
//! keyed by a normalized [`DemographicKey`].

use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use crate::canon;
use crate::error::LookupError;
use crate::format::InputFormat;
use crate::source::{record_get, Record};

pub const FINAL_SCORE_COLUMN: &str = "final_score";

pub fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// `(gender, grade)` with casing and surrounding whitespace removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DemographicKey {
    gender: String,
    grade: String,
}

impl DemographicKey {
    pub fn new(gender: &str, grade: &str) -> Self {
        Self {
            gender: normalize(gender),
            grade: normalize(grade),
        }
    }

    pub fn gender(&self) -> &str {
        &self.gender
    }

    pub fn grade(&self) -> &str {
        &self.grade
    }

    /// Column id used by threshold tables, e.g. `male_grade9`.
    pub fn column(&self) -> String {
        format!("{}_grade{}", self.gender, self.grade)
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkRow {
    pub final_score: i64,
    cells: HashMap<String, String>,
}

impl BenchmarkRow {
    pub fn cell(&self, column: &str) -> Option<&str> {
        self.cells.get(column).map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct BenchmarkTable {
    test_type: String,
    rows: Vec<BenchmarkRow>,
    columns: BTreeSet<String>,
}

impl BenchmarkTable {
    /// Builds a table from records in stored order.
    ///
    /// Every row needs an integer `final_score`, and scores may not rise from
    /// one row to the next: the scan relies on best-first ordering.
    pub fn from_records(test_type: &str, records: &[Record]) -> Result<Self, LookupError> {
        if records.is_empty() {
            return Err(LookupError::NoBenchmarkData {
                test_type: test_type.to_string(),
            });
        }

        let malformed = |reason: String| LookupError::MalformedTable {
            test_type: test_type.to_string(),
            reason,
        };

        let mut rows: Vec<BenchmarkRow> = Vec::with_capacity(records.len());
        let mut columns: BTreeSet<String> = BTreeSet::new();
        for (i, rec) in records.iter().enumerate() {
            let raw_score = record_get(rec, FINAL_SCORE_COLUMN)
                .ok_or_else(|| malformed(format!("row {} has no final_score", i + 1)))?;
            let final_score: i64 = raw_score.trim().parse().map_err(|_| {
                malformed(format!(
                    "row {} final_score {:?} is not an integer",
                    i + 1,
                    raw_score
                ))
            })?;
            if let Some(prev) = rows.last() {
                if final_score > prev.final_score {
                    return Err(malformed(format!(
                        "final_score rises from {} to {} at row {}",
                        prev.final_score,
                        final_score,
                        i + 1
                    )));
                }
            }

            let mut cells = HashMap::new();
            for (k, v) in rec {
                let col = normalize(k);
                if col == FINAL_SCORE_COLUMN || col == "test_type" {
                    continue;
                }
                columns.insert(col.clone());
                cells.insert(col, v.trim().to_string());
            }
            rows.push(BenchmarkRow { final_score, cells });
        }

        Ok(Self {
            test_type: test_type.to_string(),
            rows,
            columns,
        })
    }

    pub fn rows(&self) -> &[BenchmarkRow] {
        &self.rows
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn resolve_column(&self, key: &DemographicKey) -> Result<String, LookupError> {
        let column = key.column();
        if self.columns.contains(&column) {
            Ok(column)
        } else {
            Err(LookupError::MissingColumn {
                test_type: self.test_type.clone(),
                column,
            })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Endpoints {
    pub top: f64,
    pub bottom: f64,
}

#[derive(Debug, Clone)]
struct EndpointRow {
    key: DemographicKey,
    top_raw: String,
    bottom_raw: String,
}

/// Per-demographic `top_score`/`bottom_score` pairs for one test.
#[derive(Debug, Clone)]
pub struct EndpointTable {
    test_type: String,
    rows: Vec<EndpointRow>,
}

impl EndpointTable {
    pub fn from_records(test_type: &str, records: &[Record]) -> Self {
        let rows = records
            .iter()
            .filter_map(|rec| {
                let gender = record_get(rec, "gender")?;
                let grade = record_get(rec, "grade")?;
                Some(EndpointRow {
                    key: DemographicKey::new(gender, grade),
                    top_raw: record_get(rec, "top_score").unwrap_or("").trim().to_string(),
                    bottom_raw: record_get(rec, "bottom_score")
                        .unwrap_or("")
                        .trim()
                        .to_string(),
                })
            })
            .collect();
        Self {
            test_type: test_type.to_string(),
            rows,
        }
    }

    pub fn endpoints(
        &self,
        key: &DemographicKey,
        format: InputFormat,
    ) -> Result<Endpoints, LookupError> {
        let Some(row) = self.rows.iter().find(|r| &r.key == key) else {
            return Err(LookupError::NoBenchmarkData {
                test_type: self.test_type.clone(),
            });
        };
        let read = |raw: &str, which: &str| {
            endpoint_value(raw, format).ok_or_else(|| LookupError::MalformedTable {
                test_type: self.test_type.clone(),
                reason: format!("{} {:?} for {} is not readable", which, raw, key.column()),
            })
        };
        Ok(Endpoints {
            top: read(&row.top_raw, "top_score")?,
            bottom: read(&row.bottom_raw, "bottom_score")?,
        })
    }

    /// Smallest and largest `top_score` for a gender across all grades, as
    /// stored. Feeds the "score 100" hint on test info cards.
    pub fn top_score_range(&self, gender: &str, format: InputFormat) -> Option<(String, String)> {
        let gender = normalize(gender);
        let mut tops: Vec<(f64, &str)> = self
            .rows
            .iter()
            .filter(|r| r.key.gender() == gender)
            .filter_map(|r| endpoint_value(&r.top_raw, format).map(|v| (v, r.top_raw.as_str())))
            .collect();
        tops.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(Ordering::Equal));
        let first = tops.first()?;
        let last = tops.last()?;
        Some((first.1.to_string(), last.1.to_string()))
    }

    pub fn genders(&self) -> Vec<String> {
        let set: BTreeSet<String> = self.rows.iter().map(|r| r.key.gender().to_string()).collect();
        set.into_iter().collect()
    }
}

fn endpoint_value(raw: &str, format: InputFormat) -> Option<f64> {
    let t = raw.trim();
    match format {
        InputFormat::Time => canon::time_to_seconds(t).ok(),
        _ => t.parse::<f64>().ok().filter(|v| v.is_finite()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::record;

    #[test]
    fn key_normalizes_once() {
        let k = DemographicKey::new("  Male ", " 9");
        assert_eq!(k.column(), "male_grade9");
        assert_eq!(k, DemographicKey::new("MALE", "9 "));
    }

    #[test]
    fn table_headers_are_normalized() {
        let t = BenchmarkTable::from_records(
            "pushups",
            &[
                record(&[("Final_Score", "100"), (" Male_Grade9 ", "25")]),
                record(&[("Final_Score", "90"), (" Male_Grade9 ", "20")]),
            ],
        )
        .expect("table");
        let col = t
            .resolve_column(&DemographicKey::new("male", "9"))
            .expect("column");
        assert_eq!(t.rows()[0].cell(&col), Some("25"));
        assert_eq!(t.columns().collect::<Vec<_>>(), vec!["male_grade9"]);
    }

    #[test]
    fn rising_final_score_is_rejected() {
        let err = BenchmarkTable::from_records(
            "run",
            &[
                record(&[("final_score", "90"), ("male_grade9", "5:00")]),
                record(&[("final_score", "95"), ("male_grade9", "4:50")]),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, LookupError::MalformedTable { .. }), "{err:?}");
    }

    #[test]
    fn non_integer_final_score_is_rejected() {
        let err =
            BenchmarkTable::from_records("run", &[record(&[("final_score", "high")])]).unwrap_err();
        assert!(matches!(err, LookupError::MalformedTable { .. }));
    }

    #[test]
    fn missing_column_is_a_lookup_error() {
        let t = BenchmarkTable::from_records(
            "run",
            &[record(&[("final_score", "100"), ("male_grade9", "5:00")])],
        )
        .expect("table");
        let err = t
            .resolve_column(&DemographicKey::new("female", "9"))
            .unwrap_err();
        assert_eq!(
            err,
            LookupError::MissingColumn {
                test_type: "run".into(),
                column: "female_grade9".into()
            }
        );
    }

    #[test]
    fn endpoints_parse_per_format() {
        let t = EndpointTable::from_records(
            "run",
            &[record(&[
                ("gender", "Male"),
                ("grade", "10"),
                ("top_score", "8:00"),
                ("bottom_score", "10:00"),
            ])],
        );
        let e = t
            .endpoints(&DemographicKey::new("male", "10"), InputFormat::Time)
            .expect("endpoints");
        assert_eq!(e, Endpoints { top: 480.0, bottom: 600.0 });
        assert!(matches!(
            t.endpoints(&DemographicKey::new("female", "10"), InputFormat::Time),
            Err(LookupError::NoBenchmarkData { .. })
        ));
    }

    #[test]
    fn top_range_sorts_numerically() {
        let t = EndpointTable::from_records(
            "run",
            &[
                record(&[("gender", "male"), ("grade", "9"), ("top_score", "10:05"), ("bottom_score", "13:00")]),
                record(&[("gender", "male"), ("grade", "12"), ("top_score", "9:40"), ("bottom_score", "12:00")]),
                record(&[("gender", "female"), ("grade", "9"), ("top_score", "11:30"), ("bottom_score", "14:00")]),
            ],
        );
        assert_eq!(
            t.top_score_range("male", InputFormat::Time),
            Some(("9:40".to_string(), "10:05".to_string()))
        );
        assert_eq!(t.genders(), vec!["female".to_string(), "male".to_string()]);
    }
}

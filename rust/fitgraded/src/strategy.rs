use serde::Serialize;

use crate::benchmark::{BenchmarkTable, Endpoints};
use crate::canon::parse_benchmark_cell;
use crate::error::LookupError;
use crate::format::{Direction, InputFormat};

pub const TOP_SCORE: f64 = 100.0;
pub const BOTTOM_SCORE: f64 = 55.0;
/// Awarded by a threshold scan when the column has no usable thresholds.
pub const FLOOR_SCORE_MIN: i64 = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    Interpolation,
    ThresholdScan,
}

impl StrategyKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "interpolation" => Some(Self::Interpolation),
            "thresholdscan" => Some(Self::ThresholdScan),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Interpolation => "interpolation",
            Self::ThresholdScan => "thresholdScan",
        }
    }
}

/// A grading algorithm bound to the benchmark data it needs.
#[derive(Debug, Clone)]
pub enum GradingStrategy<'a> {
    Interpolation(Endpoints),
    ThresholdScan {
        table: &'a BenchmarkTable,
        column: String,
    },
}

impl GradingStrategy<'_> {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Interpolation(_) => StrategyKind::Interpolation,
            Self::ThresholdScan { .. } => StrategyKind::ThresholdScan,
        }
    }

    pub fn grade(&self, value: f64, format: InputFormat) -> Result<i64, LookupError> {
        match self {
            Self::Interpolation(endpoints) => interpolate(value, *endpoints, format.direction()),
            Self::ThresholdScan { table, column } => Ok(threshold_scan(value, table, column, format)),
        }
    }
}

/// Linear interpolation between `bottom` (55) and `top` (100), clamped at
/// both ends and rounded to the nearest integer.
pub fn interpolate(s: f64, e: Endpoints, direction: Direction) -> Result<i64, LookupError> {
    if e.top == e.bottom {
        if s == e.top {
            return Ok(TOP_SCORE as i64);
        }
        return Err(LookupError::DegenerateBenchmark { value: e.top });
    }

    let score = match direction {
        Direction::LowerIsBetter => {
            if s <= e.top {
                TOP_SCORE
            } else if s >= e.bottom {
                BOTTOM_SCORE
            } else {
                BOTTOM_SCORE + (TOP_SCORE - BOTTOM_SCORE) * (e.bottom - s) / (e.bottom - e.top)
            }
        }
        Direction::HigherIsBetter => {
            if s >= e.top {
                TOP_SCORE
            } else if s <= e.bottom {
                BOTTOM_SCORE
            } else {
                BOTTOM_SCORE + (TOP_SCORE - BOTTOM_SCORE) * (s - e.bottom) / (e.top - e.bottom)
            }
        }
    };
    Ok(score.round() as i64)
}

/// Returns the score of the first row, in stored order, whose threshold the
/// value meets. Gap cells are never compared.
pub fn threshold_scan(s: f64, table: &BenchmarkTable, column: &str, format: InputFormat) -> i64 {
    let direction = format.direction();
    let mut any_applicable = false;
    for row in table.rows() {
        let Some(threshold) = row.cell(column).and_then(|c| parse_benchmark_cell(c, format)) else {
            continue;
        };
        any_applicable = true;
        let met = match direction {
            Direction::LowerIsBetter => s <= threshold,
            Direction::HigherIsBetter => s >= threshold,
        };
        if met {
            return row.final_score;
        }
    }

    if !any_applicable {
        return FLOOR_SCORE_MIN;
    }
    table
        .rows()
        .last()
        .map(|r| r.final_score)
        .unwrap_or(FLOOR_SCORE_MIN)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Tier {
    Excellent,
    VeryGood,
    Fair,
    KeepPracticing,
}

impl Tier {
    pub fn from_score(score: i64) -> Self {
        if score >= 100 {
            Self::Excellent
        } else if score >= 80 {
            Self::VeryGood
        } else if score >= 60 {
            Self::Fair
        } else {
            Self::KeepPracticing
        }
    }

    pub fn message(self) -> &'static str {
        match self {
            Self::Excellent => "Well done! Excellent performance!",
            Self::VeryGood => "Very good performance!",
            Self::Fair => "Reasonable performance, keep training!",
            Self::KeepPracticing => "Keep practicing, you will improve!",
        }
    }
}

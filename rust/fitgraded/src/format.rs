use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Declared shape of a raw test result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    Time,
    Count,
    Seconds,
    Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Direction {
    LowerIsBetter,
    HigherIsBetter,
}

impl InputFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Time => "time",
            Self::Count => "count",
            Self::Seconds => "seconds",
            Self::Decimal => "decimal",
        }
    }

    pub fn direction(self) -> Direction {
        match self {
            Self::Time | Self::Seconds => Direction::LowerIsBetter,
            Self::Count | Self::Decimal => Direction::HigherIsBetter,
        }
    }

    /// Placeholder shown next to an empty input box.
    pub fn example(self) -> &'static str {
        match self {
            Self::Time => "8:30",
            Self::Count => "20",
            Self::Seconds => "12.5",
            Self::Decimal => "2.5",
        }
    }
}

impl FromStr for InputFormat {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "time" => Ok(Self::Time),
            "count" => Ok(Self::Count),
            "seconds" => Ok(Self::Seconds),
            "decimal" => Ok(Self::Decimal),
            _ => Err(ValidationError::UnknownFormat(s.to_string())),
        }
    }
}

impl fmt::Display for InputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_is_case_and_whitespace_tolerant() {
        assert_eq!(" Time ".parse::<InputFormat>().unwrap(), InputFormat::Time);
        assert_eq!("DECIMAL".parse::<InputFormat>().unwrap(), InputFormat::Decimal);
        assert!(matches!(
            "laps".parse::<InputFormat>(),
            Err(ValidationError::UnknownFormat(_))
        ));
    }

    #[test]
    fn direction_follows_format() {
        assert_eq!(InputFormat::Time.direction(), Direction::LowerIsBetter);
        assert_eq!(InputFormat::Seconds.direction(), Direction::LowerIsBetter);
        assert_eq!(InputFormat::Count.direction(), Direction::HigherIsBetter);
        assert_eq!(InputFormat::Decimal.direction(), Direction::HigherIsBetter);
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::canon::total_seconds;
use crate::error::ValidationError;
use crate::format::InputFormat;

static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+):(\d{2})$").expect("time regex"));
static COUNT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+$").expect("count regex"));
// Both "12." and ".5" are accepted; a lone "." is not.
static DECIMAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d+\.?\d*|\d*\.?\d+)$").expect("decimal regex"));

/// Lower bound applied to `count` inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CountPolicy {
    /// Zero repetitions is rejected.
    #[default]
    Positive,
    /// Zero repetitions is a valid result.
    NonNegative,
}

impl CountPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "positive" => Some(Self::Positive),
            "nonnegative" => Some(Self::NonNegative),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::NonNegative => "nonNegative",
        }
    }

    fn accepts(self, n: i64) -> bool {
        match self {
            Self::Positive => n > 0,
            Self::NonNegative => n >= 0,
        }
    }
}

pub fn validate(raw: &str, format: InputFormat, policy: CountPolicy) -> Result<(), ValidationError> {
    let t = raw.trim();
    if t.is_empty() {
        return Err(ValidationError::EmptyInput);
    }

    match format {
        InputFormat::Time => {
            let Some(caps) = TIME_RE.captures(t) else {
                return Err(ValidationError::MalformedTime);
            };
            // Same integer type and arithmetic as the canonical conversion.
            let minutes: i64 = caps[1].parse().map_err(|_| ValidationError::MalformedTime)?;
            let seconds: i64 = caps[2].parse().map_err(|_| ValidationError::MalformedTime)?;
            if total_seconds(minutes, seconds).is_none() {
                return Err(ValidationError::MalformedTime);
            }
            if seconds >= 60 {
                return Err(ValidationError::OutOfRangeTime);
            }
            if minutes == 0 && seconds == 0 {
                return Err(ValidationError::ZeroTime);
            }
        }
        InputFormat::Count => {
            if !COUNT_RE.is_match(t) {
                return Err(ValidationError::MalformedCount);
            }
            let n: i64 = t.parse().map_err(|_| ValidationError::MalformedCount)?;
            if !policy.accepts(n) {
                return Err(ValidationError::NegativeOrZeroCount);
            }
        }
        InputFormat::Seconds | InputFormat::Decimal => {
            if !DECIMAL_RE.is_match(t) {
                return Err(ValidationError::MalformedDecimal);
            }
            let v: f64 = t.parse().map_err(|_| ValidationError::MalformedDecimal)?;
            if v.is_nan() || v <= 0.0 {
                return Err(ValidationError::NonPositiveDecimal);
            }
        }
    }
    Ok(())
}

/// Same as [`validate`] but takes the format as it arrives from the data
/// source, so an unrecognised format is reported rather than unrepresentable.
pub fn validate_with_format_name(
    raw: &str,
    format: &str,
    policy: CountPolicy,
) -> Result<InputFormat, ValidationError> {
    if raw.trim().is_empty() {
        return Err(ValidationError::EmptyInput);
    }
    let format: InputFormat = format.parse()?;
    validate(raw, format, policy)?;
    Ok(format)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(raw: &str, format: InputFormat) -> Result<(), ValidationError> {
        validate(raw, format, CountPolicy::Positive)
    }

    #[test]
    fn blank_input_is_empty_for_every_format() {
        for f in [
            InputFormat::Time,
            InputFormat::Count,
            InputFormat::Seconds,
            InputFormat::Decimal,
        ] {
            assert_eq!(check("", f), Err(ValidationError::EmptyInput));
            assert_eq!(check("   \t", f), Err(ValidationError::EmptyInput));
        }
    }

    #[test]
    fn time_grammar_and_range() {
        assert_eq!(check("8:30", InputFormat::Time), Ok(()));
        assert_eq!(check(" 12:05 ", InputFormat::Time), Ok(()));
        assert_eq!(check("0:01", InputFormat::Time), Ok(()));
        assert_eq!(check("8:3", InputFormat::Time), Err(ValidationError::MalformedTime));
        assert_eq!(check("8:300", InputFormat::Time), Err(ValidationError::MalformedTime));
        assert_eq!(check("-1:30", InputFormat::Time), Err(ValidationError::MalformedTime));
        assert_eq!(check("830", InputFormat::Time), Err(ValidationError::MalformedTime));
        assert_eq!(check("8:60", InputFormat::Time), Err(ValidationError::OutOfRangeTime));
        assert_eq!(check("0:00", InputFormat::Time), Err(ValidationError::ZeroTime));
    }

    #[test]
    fn count_bound_follows_policy() {
        assert_eq!(check("20", InputFormat::Count), Ok(()));
        assert_eq!(check("2.5", InputFormat::Count), Err(ValidationError::MalformedCount));
        assert_eq!(check("-3", InputFormat::Count), Err(ValidationError::MalformedCount));
        assert_eq!(check("0", InputFormat::Count), Err(ValidationError::NegativeOrZeroCount));
        assert_eq!(validate("0", InputFormat::Count, CountPolicy::NonNegative), Ok(()));
    }

    #[test]
    fn oversized_integers_are_malformed() {
        assert_eq!(
            check("200000000000000000:00", InputFormat::Time),
            Err(ValidationError::MalformedTime)
        );
        assert_eq!(
            check("99999999999999999999:00", InputFormat::Time),
            Err(ValidationError::MalformedTime)
        );
        assert_eq!(check("153722867280912930:07", InputFormat::Time), Ok(()));
        assert_eq!(
            check("9223372036854775808", InputFormat::Count),
            Err(ValidationError::MalformedCount)
        );
        assert_eq!(check("9223372036854775807", InputFormat::Count), Ok(()));
    }

    #[test]
    fn decimal_accepts_both_leading_forms() {
        for ok in ["12.5", "12", "12.", ".5", "0.1"] {
            assert_eq!(check(ok, InputFormat::Decimal), Ok(()), "{ok}");
            assert_eq!(check(ok, InputFormat::Seconds), Ok(()), "{ok}");
        }
        assert_eq!(check(".", InputFormat::Decimal), Err(ValidationError::MalformedDecimal));
        assert_eq!(check("1.2.3", InputFormat::Decimal), Err(ValidationError::MalformedDecimal));
        assert_eq!(check("abc", InputFormat::Seconds), Err(ValidationError::MalformedDecimal));
        assert_eq!(check("0", InputFormat::Decimal), Err(ValidationError::NonPositiveDecimal));
        assert_eq!(check("0.0", InputFormat::Seconds), Err(ValidationError::NonPositiveDecimal));
    }

    #[test]
    fn unknown_format_name_is_reported() {
        let res = validate_with_format_name("12", "laps", CountPolicy::Positive);
        assert_eq!(res, Err(ValidationError::UnknownFormat("laps".into())));
        let res = validate_with_format_name("1:10", "time", CountPolicy::Positive);
        assert_eq!(res, Ok(InputFormat::Time));
    }
}

//! Timeout values as they appear in job requests
//!
//! A duration is either a JSON number of nanoseconds or a string such as
//! `"1s"`, `"1.5s"`, `"500ms"` or `"1h2m3s"`. Negative values clamp to
//! zero, which makes the corresponding deadline expire immediately.

use schemars::gen::SchemaGenerator;
use schemars::schema::{InstanceType, Schema, SchemaObject, SingleOrVec};
use schemars::JsonSchema;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

const NANOSECOND: u64 = 1;
const MICROSECOND: u64 = 1_000 * NANOSECOND;
const MILLISECOND: u64 = 1_000 * MICROSECOND;
const SECOND: u64 = 1_000 * MILLISECOND;
const MINUTE: u64 = 60 * SECOND;
const HOUR: u64 = 60 * MINUTE;

/// Error returned when a duration string cannot be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DurationParseError {
    #[error("time: invalid duration {0:?}")]
    Invalid(String),

    #[error("time: missing unit in duration {0:?}")]
    MissingUnit(String),

    #[error("time: unknown unit {unit:?} in duration {input:?}")]
    UnknownUnit { unit: String, input: String },
}

/// A job timeout
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobDuration(Duration);

impl JobDuration {
    pub const fn from_duration(d: Duration) -> Self {
        Self(d)
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

impl From<Duration> for JobDuration {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl From<JobDuration> for Duration {
    fn from(d: JobDuration) -> Self {
        d.0
    }
}

impl FromStr for JobDuration {
    type Err = DurationParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_duration(s).map(JobDuration)
    }
}

fn unit_nanos(unit: &str) -> Option<u64> {
    match unit {
        "ns" => Some(NANOSECOND),
        "us" | "µs" | "μs" => Some(MICROSECOND),
        "ms" => Some(MILLISECOND),
        "s" => Some(SECOND),
        "m" => Some(MINUTE),
        "h" => Some(HOUR),
        _ => None,
    }
}

/// Parse a duration string: an optional sign followed by one or more
/// `<decimal><unit>` groups.
fn parse_duration(input: &str) -> Result<Duration, DurationParseError> {
    let invalid = || DurationParseError::Invalid(input.to_string());

    let mut s = input;
    let mut negative = false;
    if let Some(rest) = s.strip_prefix('-') {
        negative = true;
        s = rest;
    } else if let Some(rest) = s.strip_prefix('+') {
        s = rest;
    }

    if s == "0" {
        return Ok(Duration::ZERO);
    }
    if s.is_empty() {
        return Err(invalid());
    }

    let mut total: u64 = 0;
    while !s.is_empty() {
        if !s.starts_with(|c: char| c == '.' || c.is_ascii_digit()) {
            return Err(invalid());
        }

        let int_len = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
        let int_part = &s[..int_len];
        s = &s[int_len..];
        let whole: u64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| invalid())?
        };

        let mut frac: u128 = 0;
        let mut scale: u128 = 1;
        let mut has_frac = false;
        if let Some(rest) = s.strip_prefix('.') {
            let frac_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            for digit in rest[..frac_len].bytes() {
                // Digits past nanosecond-of-hour precision cannot change the result.
                if scale >= 10u128.pow(20) {
                    break;
                }
                frac = frac * 10 + u128::from(digit - b'0');
                scale *= 10;
            }
            has_frac = frac_len > 0;
            s = &rest[frac_len..];
        }
        if int_part.is_empty() && !has_frac {
            return Err(invalid());
        }

        let unit_len = s
            .find(|c: char| c == '.' || c.is_ascii_digit())
            .unwrap_or(s.len());
        let unit = &s[..unit_len];
        s = &s[unit_len..];
        if unit.is_empty() {
            return Err(DurationParseError::MissingUnit(input.to_string()));
        }
        let per_unit = unit_nanos(unit).ok_or_else(|| DurationParseError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let whole_nanos = whole.checked_mul(per_unit).ok_or_else(invalid)?;
        let frac_nanos = u64::try_from(frac * u128::from(per_unit) / scale).map_err(|_| invalid())?;
        total = total
            .checked_add(whole_nanos)
            .and_then(|t| t.checked_add(frac_nanos))
            .ok_or_else(invalid)?;
    }

    if negative {
        return Ok(Duration::ZERO);
    }
    Ok(Duration::from_nanos(total))
}

/// Format `value / 10^precision` without trailing zeros.
fn push_fraction(out: &mut String, value: u64, precision: u32) {
    let scale = 10u64.pow(precision);
    out.push_str(&(value / scale).to_string());
    let rem = value % scale;
    if rem != 0 {
        let digits = format!("{:0width$}", rem, width = precision as usize);
        out.push('.');
        out.push_str(digits.trim_end_matches('0'));
    }
}

impl fmt::Display for JobDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = u64::try_from(self.0.as_nanos()).unwrap_or(u64::MAX);
        let mut out = String::new();

        if nanos == 0 {
            out.push_str("0s");
        } else if nanos < MICROSECOND {
            out.push_str(&nanos.to_string());
            out.push_str("ns");
        } else if nanos < MILLISECOND {
            push_fraction(&mut out, nanos, 3);
            out.push_str("µs");
        } else if nanos < SECOND {
            push_fraction(&mut out, nanos, 6);
            out.push_str("ms");
        } else {
            let hours = nanos / HOUR;
            let minutes = (nanos % HOUR) / MINUTE;
            let rest = nanos % MINUTE;
            if hours > 0 {
                out.push_str(&format!("{}h", hours));
            }
            if hours > 0 || minutes > 0 {
                out.push_str(&format!("{}m", minutes));
            }
            push_fraction(&mut out, rest, 9);
            out.push('s');
        }

        f.write_str(&out)
    }
}

impl Serialize for JobDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

struct JobDurationVisitor;

impl<'de> Visitor<'de> for JobDurationVisitor {
    type Value = JobDuration;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a number of nanoseconds or a duration string")
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(JobDuration(Duration::from_nanos(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(JobDuration(Duration::from_nanos(u64::try_from(v).unwrap_or(0))))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        // `as` saturates: negatives become 0, huge values u64::MAX.
        Ok(JobDuration(Duration::from_nanos(v as u64)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        v.parse().map_err(E::custom)
    }

    fn visit_bool<E: de::Error>(self, _: bool) -> Result<Self::Value, E> {
        Err(E::custom("invalid duration"))
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Err(E::custom("invalid duration"))
    }

    fn visit_seq<A: de::SeqAccess<'de>>(self, _: A) -> Result<Self::Value, A::Error> {
        Err(de::Error::custom("invalid duration"))
    }

    fn visit_map<A: de::MapAccess<'de>>(self, _: A) -> Result<Self::Value, A::Error> {
        Err(de::Error::custom("invalid duration"))
    }
}

impl<'de> Deserialize<'de> for JobDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(JobDurationVisitor)
    }
}

impl JsonSchema for JobDuration {
    fn schema_name() -> String {
        "Duration".to_string()
    }

    fn json_schema(generator: &mut SchemaGenerator) -> Schema {
        let mut schema = SchemaObject::default();
        schema.metadata().description = Some(
            "Nanoseconds as a number, or a duration string such as \"1s\" or \"500ms\""
                .to_string(),
        );
        schema.subschemas().any_of = Some(vec![
            generator.subschema_for::<u64>(),
            Schema::Object(SchemaObject {
                instance_type: Some(SingleOrVec::Single(Box::new(InstanceType::String))),
                ..Default::default()
            }),
        ]);
        Schema::Object(schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(s: &str) -> Result<Duration, DurationParseError> {
        s.parse::<JobDuration>().map(Duration::from)
    }

    #[test]
    fn test_parse_simple_units() {
        assert_eq!(parse("1s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse("250us").unwrap(), Duration::from_micros(250));
        assert_eq!(parse("250µs").unwrap(), Duration::from_micros(250));
        assert_eq!(parse("42ns").unwrap(), Duration::from_nanos(42));
        assert_eq!(parse("2m").unwrap(), Duration::from_secs(120));
        assert_eq!(parse("1h").unwrap(), Duration::from_secs(3600));
    }

    #[test]
    fn test_parse_compound_and_fractional() {
        assert_eq!(parse("1h2m3s").unwrap(), Duration::from_secs(3723));
        assert_eq!(parse("1.5s").unwrap(), Duration::from_millis(1500));
        assert_eq!(parse(".5s").unwrap(), Duration::from_millis(500));
        assert_eq!(parse("1.s").unwrap(), Duration::from_secs(1));
        assert_eq!(parse("+3s").unwrap(), Duration::from_secs(3));
        assert_eq!(parse("0").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_negative_clamps_to_zero() {
        assert_eq!(parse("-1s").unwrap(), Duration::ZERO);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(
            parse("1").unwrap_err().to_string(),
            "time: missing unit in duration \"1\""
        );
        assert_eq!(
            parse("1x").unwrap_err().to_string(),
            "time: unknown unit \"x\" in duration \"1x\""
        );
        assert_eq!(
            parse("abc").unwrap_err().to_string(),
            "time: invalid duration \"abc\""
        );
        assert!(parse("").is_err());
        assert!(parse(".s").is_err());
        assert!(parse("-").is_err());
    }

    #[test]
    fn test_display() {
        let cases = [
            (Duration::ZERO, "0s"),
            (Duration::from_nanos(100), "100ns"),
            (Duration::from_nanos(1_500), "1.5µs"),
            (Duration::from_millis(500), "500ms"),
            (Duration::from_secs(1), "1s"),
            (Duration::from_millis(1_500), "1.5s"),
            (Duration::from_secs(90), "1m30s"),
            (Duration::from_secs(3600), "1h0m0s"),
        ];
        for (d, expected) in cases {
            assert_eq!(JobDuration::from(d).to_string(), expected);
        }
    }

    #[test]
    fn test_serialize_as_string() {
        let json = serde_json::to_string(&JobDuration::from(Duration::from_secs(1))).unwrap();
        assert_eq!(json, "\"1s\"");
    }

    #[test]
    fn test_deserialize_number_and_string() {
        let d: JobDuration = serde_json::from_str("1000000000").unwrap();
        assert_eq!(d.as_duration(), Duration::from_secs(1));

        let d: JobDuration = serde_json::from_str("1.5e9").unwrap();
        assert_eq!(d.as_duration(), Duration::from_millis(1500));

        let d: JobDuration = serde_json::from_str("-5").unwrap();
        assert_eq!(d.as_duration(), Duration::ZERO);

        let d: JobDuration = serde_json::from_str("\"1s\"").unwrap();
        assert_eq!(d.as_duration(), Duration::from_secs(1));
    }

    #[test]
    fn test_deserialize_invalid_shapes() {
        let err = serde_json::from_str::<JobDuration>("{}").unwrap_err();
        assert!(err.to_string().starts_with("invalid duration"));

        let err = serde_json::from_str::<JobDuration>("true").unwrap_err();
        assert!(err.to_string().starts_with("invalid duration"));

        let err = serde_json::from_str::<JobDuration>("\"1\"").unwrap_err();
        assert!(err.to_string().contains("missing unit"));
    }
}

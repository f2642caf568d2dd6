//! Durations as they appear in `TrafficPolicy` resources (Go `time.Duration`
//! strings such as `"2s"` or `"1m30s"`) and as they must be written into
//! Istio resources (protobuf JSON durations such as `"2s"` or `"0.500s"`).

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time::Duration};

#[derive(Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct K8sDuration {
    duration: Duration,
    is_negative: bool,
}

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("invalid unit: {}", EXPECTED_UNITS)]
    InvalidUnit,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("invalid floating-point number: {}", .0)]
    NotANumber(#[from] std::num::ParseFloatError),

    #[error("duration out of range")]
    OutOfRange,
}

const EXPECTED_UNITS: &str = "expected one of 'ns', 'us', '\u{00b5}s', 'ms', 's', 'm', or 'h'";

impl From<Duration> for K8sDuration {
    fn from(duration: Duration) -> Self {
        Self {
            duration,
            is_negative: false,
        }
    }
}

impl From<K8sDuration> for Duration {
    fn from(K8sDuration { duration, .. }: K8sDuration) -> Self {
        duration
    }
}

impl K8sDuration {
    #[inline]
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.is_negative && !self.duration.is_zero()
    }

    /// Formats the duration the way protobuf's JSON mapping expects:
    /// fractional seconds with 0, 3, 6 or 9 digits and an `s` suffix.
    pub fn to_proto_json(&self) -> String {
        let sign = if self.is_negative() { "-" } else { "" };
        let secs = self.duration.as_secs();
        let nanos = self.duration.subsec_nanos();
        if nanos == 0 {
            format!("{sign}{secs}s")
        } else if nanos % 1_000_000 == 0 {
            format!("{sign}{secs}.{:03}s", nanos / 1_000_000)
        } else if nanos % 1_000 == 0 {
            format!("{sign}{secs}.{:06}s", nanos / 1_000)
        } else {
            format!("{sign}{secs}.{nanos:09}s")
        }
    }
}

impl fmt::Debug for K8sDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl fmt::Display for K8sDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_negative() {
            f.write_str("-")?;
        }
        // `Duration`'s debug output ("1.5s", "250ms", "10ns") is also valid Go
        // duration syntax.
        fmt::Debug::fmt(&self.duration, f)
    }
}

impl FromStr for K8sDuration {
    type Err = ParseError;

    // Follows Go's `time.ParseDuration`: a signed sequence of decimal numbers,
    // each with an optional fraction and a mandatory unit suffix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let is_negative = s.starts_with('-');
        let mut rest = s.trim_start_matches(['+', '-']);

        if rest == "0" {
            return Ok(Self {
                duration: Duration::ZERO,
                is_negative,
            });
        }
        if rest.is_empty() {
            return Err(ParseError::NoUnit);
        }

        let mut total = Duration::ZERO;
        while !rest.is_empty() {
            let unit_start = rest
                .find(|c: char| c.is_alphabetic())
                .ok_or(ParseError::NoUnit)?;
            let (value, tail) = rest.split_at(unit_start);
            let unit_end = tail
                .find(|c: char| !c.is_alphabetic())
                .unwrap_or(tail.len());
            let (unit, tail) = tail.split_at(unit_end);
            let value = value.parse::<f64>()?;
            if value.is_sign_negative() {
                return Err(ParseError::OutOfRange);
            }
            let part = Duration::try_from_secs_f64(unit_base(unit)?.as_secs_f64() * value)
                .map_err(|_| ParseError::OutOfRange)?;
            total = total.checked_add(part).ok_or(ParseError::OutOfRange)?;
            rest = tail;
        }

        Ok(Self {
            duration: total,
            is_negative,
        })
    }
}

fn unit_base(unit: &str) -> Result<Duration, ParseError> {
    const MINUTE: Duration = Duration::from_secs(60);
    match unit {
        "ns" => Ok(Duration::from_nanos(1)),
        // U+00B5 is the "micro sign" while U+03BC is "Greek letter mu"
        "us" | "\u{00b5}s" | "\u{03bc}s" => Ok(Duration::from_micros(1)),
        "ms" => Ok(Duration::from_millis(1)),
        "s" => Ok(Duration::from_secs(1)),
        "m" => Ok(MINUTE),
        "h" => Ok(MINUTE * 60),
        _ => Err(ParseError::InvalidUnit),
    }
}

impl Serialize for K8sDuration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for K8sDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = K8sDuration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a string in Go `time.Duration.String()` format")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse::<K8sDuration>().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}

impl schemars::JsonSchema for K8sDuration {
    fn schema_name() -> String {
        "K8sDuration".to_owned()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            // Not "duration": that format denotes ISO 8601.
            format: None,
            ..Default::default()
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: Duration = Duration::from_secs(60);

    #[test]
    fn parses_go_durations() {
        let cases: &[(&str, Duration)] = &[
            ("0", Duration::ZERO),
            ("5s", Duration::from_secs(5)),
            ("+5s", Duration::from_secs(5)),
            ("5.6s", Duration::from_millis(5600)),
            (".5s", Duration::from_millis(500)),
            ("10ns", Duration::from_nanos(10)),
            ("12µs", Duration::from_micros(12)),
            ("13ms", Duration::from_millis(13)),
            ("15m", 15 * MINUTE),
            ("3h30m", 210 * MINUTE),
            ("1m30s", Duration::from_secs(90)),
        ];
        for (input, expected) in cases {
            let parsed = input.parse::<K8sDuration>().unwrap();
            assert_eq!(Duration::from(parsed), *expected, "{input}");
            assert!(!parsed.is_negative(), "{input}");
        }
    }

    #[test]
    fn rejects_malformed_durations() {
        assert_eq!("5".parse::<K8sDuration>(), Err(ParseError::NoUnit));
        assert_eq!("".parse::<K8sDuration>(), Err(ParseError::NoUnit));
        assert_eq!("5d".parse::<K8sDuration>(), Err(ParseError::InvalidUnit));
        assert!(matches!(
            "1.2.3s".parse::<K8sDuration>(),
            Err(ParseError::NotANumber(_))
        ));
        assert_eq!("1m-5s".parse::<K8sDuration>(), Err(ParseError::OutOfRange));
        assert_eq!(
            "99999999999999999999h".parse::<K8sDuration>(),
            Err(ParseError::OutOfRange)
        );
    }

    #[test]
    fn negative_durations() {
        let d = "-2m3.4s".parse::<K8sDuration>().unwrap();
        assert!(d.is_negative());
        assert_eq!(Duration::from(d), Duration::from_millis(123_400));
        // Negative zero is just zero.
        assert!(!"-0".parse::<K8sDuration>().unwrap().is_negative());
    }

    #[test]
    fn formats_protobuf_json() {
        for (input, expected) in [
            ("2s", "2s"),
            ("500ms", "0.500s"),
            ("1.5s", "1.500s"),
            ("1m", "60s"),
            ("11us", "0.000011s"),
            ("10ns", "0.000000010s"),
            ("-3s", "-3s"),
        ] {
            let d = input.parse::<K8sDuration>().unwrap();
            assert_eq!(d.to_proto_json(), expected, "{input}");
        }
    }

    #[test]
    fn display_reparses() {
        for input in ["2s", "250ms", "1.5s", "10ns", "-4s"] {
            let d = input.parse::<K8sDuration>().unwrap();
            assert_eq!(d.to_string().parse::<K8sDuration>().unwrap(), d, "{input}");
        }
    }
}

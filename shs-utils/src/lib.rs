//! Shared utility functions for Sentinel Hub Statistical crates.

/// Time interval parsing and serialization
pub mod time {
    use crate::error::TimeError;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, TimeDelta, Utc};

    /// Marker used by Sentinel Hub for an open end of a time interval.
    pub const UNDEFINED: &str = "..";

    const DATE_FORMAT: &str = "%Y-%m-%d";

    const NAIVE_DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];

    /// One end of a time interval, as supplied by a caller.
    #[derive(Debug, Clone, PartialEq)]
    pub enum TimeBound {
        Undefined,
        Text(String),
        Date(NaiveDate),
        DateTime(NaiveDateTime),
        Utc(DateTime<Utc>),
    }

    impl From<&str> for TimeBound {
        fn from(value: &str) -> Self {
            TimeBound::Text(value.to_string())
        }
    }

    impl From<String> for TimeBound {
        fn from(value: String) -> Self {
            TimeBound::Text(value)
        }
    }

    impl From<NaiveDate> for TimeBound {
        fn from(value: NaiveDate) -> Self {
            TimeBound::Date(value)
        }
    }

    impl From<NaiveDateTime> for TimeBound {
        fn from(value: NaiveDateTime) -> Self {
            TimeBound::DateTime(value)
        }
    }

    impl From<DateTime<Utc>> for TimeBound {
        fn from(value: DateTime<Utc>) -> Self {
            TimeBound::Utc(value)
        }
    }

    impl From<Option<DateTime<Utc>>> for TimeBound {
        fn from(value: Option<DateTime<Utc>>) -> Self {
            value.map_or(TimeBound::Undefined, TimeBound::Utc)
        }
    }

    /// A caller-facing time interval: a pair of bounds, a single bound, or
    /// the undefined interval.
    #[derive(Debug, Clone, PartialEq)]
    pub enum TimeSpec {
        Undefined,
        Single(TimeBound),
        Pair(TimeBound, TimeBound),
    }

    impl<A: Into<TimeBound>, B: Into<TimeBound>> From<(A, B)> for TimeSpec {
        fn from((start, end): (A, B)) -> Self {
            TimeSpec::Pair(start.into(), end.into())
        }
    }

    impl From<TimeBound> for TimeSpec {
        fn from(value: TimeBound) -> Self {
            TimeSpec::Single(value)
        }
    }

    impl From<&str> for TimeSpec {
        fn from(value: &str) -> Self {
            TimeSpec::Single(value.into())
        }
    }

    impl From<NaiveDate> for TimeSpec {
        fn from(value: NaiveDate) -> Self {
            TimeSpec::Single(value.into())
        }
    }

    impl From<TimeInterval> for TimeSpec {
        fn from(value: TimeInterval) -> Self {
            TimeSpec::Pair(value.start.into(), value.end.into())
        }
    }

    /// A normalized interval in UTC. `None` marks an open end.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TimeInterval {
        pub start: Option<DateTime<Utc>>,
        pub end: Option<DateTime<Utc>>,
    }

    enum Parsed {
        Date(NaiveDate),
        Instant(DateTime<Utc>),
    }

    impl Parsed {
        fn start_of_day(self) -> DateTime<Utc> {
            match self {
                Parsed::Date(date) => date.and_time(NaiveTime::MIN).and_utc(),
                Parsed::Instant(instant) => instant,
            }
        }
    }

    fn parse_text(text: &str) -> Result<Option<Parsed>, TimeError> {
        let text = text.trim();
        if text.is_empty() || text == UNDEFINED {
            return Ok(None);
        }
        if let Ok(aware) = DateTime::parse_from_rfc3339(text) {
            return Ok(Some(Parsed::Instant(aware.with_timezone(&Utc))));
        }
        if let Some(naive) = NAIVE_DATETIME_FORMATS
            .iter()
            .find_map(|format| NaiveDateTime::parse_from_str(text, format).ok())
        {
            return Ok(Some(Parsed::Instant(naive.and_utc())));
        }
        NaiveDate::parse_from_str(text, DATE_FORMAT)
            .map(|date| Some(Parsed::Date(date)))
            .map_err(|_| TimeError::InvalidTime(text.to_string()))
    }

    fn parse_bound(bound: &TimeBound, allow_undefined: bool) -> Result<Option<Parsed>, TimeError> {
        let parsed = match bound {
            TimeBound::Undefined => None,
            TimeBound::Text(text) => parse_text(text)?,
            TimeBound::Date(date) => Some(Parsed::Date(*date)),
            TimeBound::DateTime(naive) => Some(Parsed::Instant(naive.and_utc())),
            TimeBound::Utc(instant) => Some(Parsed::Instant(*instant)),
        };
        if parsed.is_none() && !allow_undefined {
            return Err(TimeError::UndefinedNotAllowed);
        }
        Ok(parsed)
    }

    /// Normalize a caller-facing interval into UTC start/end instants.
    ///
    /// Dates without a time of day are taken at midnight UTC. A single date
    /// or instant `t` becomes the one-day interval `[t, t + 1 day)`.
    pub fn parse_time_interval(
        spec: &TimeSpec,
        allow_undefined: bool,
    ) -> Result<TimeInterval, TimeError> {
        let (start, end) = match spec {
            TimeSpec::Undefined => {
                if !allow_undefined {
                    return Err(TimeError::UndefinedNotAllowed);
                }
                (None, None)
            }
            TimeSpec::Single(bound) => match parse_bound(bound, allow_undefined)? {
                None => (None, None),
                Some(parsed) => {
                    let start = parsed.start_of_day();
                    (Some(start), Some(start + TimeDelta::days(1)))
                }
            },
            TimeSpec::Pair(start, end) => (
                parse_bound(start, allow_undefined)?.map(Parsed::start_of_day),
                parse_bound(end, allow_undefined)?.map(Parsed::start_of_day),
            ),
        };

        if let (Some(start), Some(end)) = (start, end) {
            if start > end {
                return Err(TimeError::ReversedInterval { start, end });
            }
        }
        Ok(TimeInterval { start, end })
    }

    /// Serialize a single instant. With `use_tz` the result is an RFC 3339
    /// string in UTC with a `Z` suffix, otherwise a naive ISO 8601 string.
    pub fn serialize_instant(instant: Option<&DateTime<Utc>>, use_tz: bool) -> String {
        match instant {
            None => UNDEFINED.to_string(),
            Some(instant) if use_tz => instant.to_rfc3339_opts(SecondsFormat::AutoSi, true),
            Some(instant) => instant
                .naive_utc()
                .format("%Y-%m-%dT%H:%M:%S%.f")
                .to_string(),
        }
    }

    /// Serialize both ends of an interval. Open ends become `..`.
    pub fn serialize_time(interval: &TimeInterval, use_tz: bool) -> (String, String) {
        (
            serialize_instant(interval.start.as_ref(), use_tz),
            serialize_instant(interval.end.as_ref(), use_tz),
        )
    }

}

/// Deep merge of free-form overrides into a payload
pub mod merge {
    use serde_json::{Map, Value};

    /// Merge `overrides` into `target`. Nested objects present on both sides
    /// are merged recursively; any other override value replaces the target's.
    pub fn update_other_args(target: &mut Map<String, Value>, overrides: &Map<String, Value>) {
        for (key, value) in overrides {
            if let (Some(Value::Object(existing)), Value::Object(nested)) = (target.get_mut(key), value) {
                update_other_args(existing, nested);
                continue;
            }
            target.insert(key.clone(), value.clone());
        }
    }

    #[cfg(test)]
    mod tests {
        use super::update_other_args;
        use serde_json::{json, Value};

        fn merged(mut target: Value, overrides: Value) -> Value {
            update_other_args(
                target.as_object_mut().unwrap(),
                overrides.as_object().unwrap(),
            );
            target
        }

        #[test]
        fn test_nested_maps_are_unioned() {
            let result = merged(
                json!({"calculations": {"default": {}}, "input": {"bounds": {"bbox": [0, 0, 1, 1]}}}),
                json!({"calculations": {"custom": {"histograms": {"default": {}}}}}),
            );
            assert_eq!(
                result,
                json!({
                    "calculations": {"default": {}, "custom": {"histograms": {"default": {}}}},
                    "input": {"bounds": {"bbox": [0, 0, 1, 1]}}
                })
            );
        }

        #[test]
        fn test_overrides_win_on_scalars_and_lists() {
            let result = merged(
                json!({"width": 512, "bbox": [0, 0, 1, 1], "nested": {"a": 1}}),
                json!({"width": 256, "bbox": [2, 2, 3, 3], "nested": 7}),
            );
            assert_eq!(result, json!({"width": 256, "bbox": [2, 2, 3, 3], "nested": 7}));
        }

        #[test]
        fn test_new_keys_are_added() {
            let result = merged(json!({}), json!({"resx": 10.0}));
            assert_eq!(result, json!({"resx": 10.0}));
        }
    }
}

/// Error types
pub mod error {
    use chrono::{DateTime, Utc};
    use thiserror::Error;

    #[derive(Error, Debug, Clone, PartialEq, Eq)]
    pub enum TimeError {
        /// A time value could not be parsed
        #[error("Invalid time value: {0}")]
        InvalidTime(String),

        /// An open interval end was given where one is not allowed
        #[error("Time interval must be defined")]
        UndefinedNotAllowed,

        /// Start of the interval lies after its end
        #[error("Start of time interval ({start}) is after its end ({end})")]
        ReversedInterval {
            start: DateTime<Utc>,
            end: DateTime<Utc>,
        },
    }
}

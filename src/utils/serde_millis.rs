//! `Duration` as whole milliseconds in config files
//!
//! Use with `#[serde(with = "crate::utils::serde_millis")]`, or the
//! [`option`] submodule for `Option<Duration>`.

use serde::{Deserialize, Deserializer, Serializer};
use std::time::Duration;

pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
}

pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

pub mod option {
    use super::{Deserialize, Deserializer, Duration, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Timings {
        #[serde(with = "super")]
        delay: Duration,
        #[serde(default, with = "super::option")]
        limit: Option<Duration>,
    }

    #[test]
    fn test_reads_plain_milliseconds() {
        let parsed: Timings = serde_json::from_str(r#"{"delay": 1500}"#).unwrap();
        assert_eq!(parsed.delay, Duration::from_millis(1500));
        assert_eq!(parsed.limit, None);

        let parsed: Timings = serde_json::from_str(r#"{"delay": 0, "limit": 250}"#).unwrap();
        assert_eq!(parsed.limit, Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_writes_plain_milliseconds() {
        let json = serde_json::to_value(Timings {
            delay: Duration::from_secs(2),
            limit: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"delay": 2000, "limit": null}));
    }
}

//! Interaction event envelope and wire format
//!
//! Events travel as JSON bodies between admission, the broker, and the
//! projector workers. `event_time` uses the `YYYY-MM-DD HH:MM:SS` UTC
//! format at second precision; `published_at` and the retry bookkeeping
//! timestamps use RFC 3339.

use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ShopGraphError};

/// Wire format for `event_time`: strictly UTC at second precision.
pub const EVENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Kind of user-product interaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    View,
    Cart,
    Purchase,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::View => "view",
            EventType::Cart => "cart",
            EventType::Purchase => "purchase",
        }
    }

    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "view" => Ok(EventType::View),
            "cart" => Ok(EventType::Cart),
            "purchase" => Ok(EventType::Purchase),
            other => Err(ShopGraphError::invalid_input(format!(
                "unknown event_type '{other}'"
            ))),
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drop sub-second precision; every stored `event_time` has microsecond 0.
pub fn truncate_to_second(time: DateTime<Utc>) -> DateTime<Utc> {
    time.with_nanosecond(0).unwrap_or(time)
}

/// Parse the `YYYY-MM-DD HH:MM:SS` wire format, assuming UTC.
pub fn parse_event_time(value: &str) -> Result<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, EVENT_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| ShopGraphError::invalid_input(format!("invalid event_time '{value}': {e}")))
}

/// Format a timestamp into the `YYYY-MM-DD HH:MM:SS` wire format.
pub fn format_event_time(time: DateTime<Utc>) -> String {
    time.format(EVENT_TIME_FORMAT).to_string()
}

/// Serde adapter for the second-precision wire format
pub mod event_time_format {
    use chrono::{DateTime, Utc};
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&super::format_event_time(*time))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        super::parse_event_time(&value).map_err(serde::de::Error::custom)
    }

    /// Variant for `Option<DateTime<Utc>>` fields
    pub mod option {
        use chrono::{DateTime, Utc};
        use serde::{self, Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(
            time: &Option<DateTime<Utc>>,
            serializer: S,
        ) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match time {
                Some(t) => serializer.serialize_some(&super::super::format_event_time(*t)),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let value = Option::<String>::deserialize(deserializer)?;
            value
                .map(|v| super::super::parse_event_time(&v).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

/// Event envelope as published to the broker and consumed by projectors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    #[serde(with = "event_time_format")]
    pub event_time: DateTime<Utc>,
    pub event_type: EventType,
    pub product_id: i64,
    pub user_id: i64,
    pub user_session: String,
    /// Injected by the publisher at publish time
    #[serde(skip_serializing_if = "Option::is_none")]
    pub published_at: Option<DateTime<Utc>>,
    /// Monotonically non-decreasing across requeues
    #[serde(default)]
    pub retry_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_retry_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_at: Option<DateTime<Utc>>,
}

impl EventEnvelope {
    pub fn new(
        event_time: DateTime<Utc>,
        event_type: EventType,
        product_id: i64,
        user_id: i64,
        user_session: impl Into<String>,
    ) -> Self {
        Self {
            event_time: truncate_to_second(event_time),
            event_type,
            product_id,
            user_id,
            user_session: user_session.into(),
            published_at: None,
            retry_count: 0,
            last_error: None,
            last_retry_at: None,
            final_error: None,
            failed_at: None,
        }
    }

    /// Parse a broker delivery body.
    ///
    /// Distinguishes two unrecoverable cases, both of which the worker
    /// rejects without requeue: a body that is not valid JSON, and a JSON
    /// object missing one of the required fields (`user_id`, `product_id`,
    /// `event_type`). `event_time` defaults to now and `user_session` to
    /// the empty string when absent.
    pub fn parse(body: &[u8]) -> Result<Self> {
        let raw: RawEvent = serde_json::from_slice(body)
            .map_err(|e| ShopGraphError::invalid_input(format!("malformed event body: {e}")))?;

        let user_id = raw
            .user_id
            .ok_or_else(|| ShopGraphError::invalid_input("event is missing user_id"))?;
        let product_id = raw
            .product_id
            .ok_or_else(|| ShopGraphError::invalid_input("event is missing product_id"))?;
        let event_type = raw
            .event_type
            .ok_or_else(|| ShopGraphError::invalid_input("event is missing event_type"))?;

        let event_time = match raw.event_time {
            Some(value) => parse_event_time(&value)?,
            None => truncate_to_second(Utc::now()),
        };

        Ok(Self {
            event_time,
            event_type,
            product_id,
            user_id,
            user_session: raw.user_session.unwrap_or_default(),
            published_at: raw.published_at,
            retry_count: raw.retry_count.unwrap_or(0),
            last_error: raw.last_error,
            last_retry_at: raw.last_retry_at,
            final_error: None,
            failed_at: None,
        })
    }
}

/// Loose mirror of the wire envelope used to report precise admission errors
#[derive(Debug, Deserialize)]
struct RawEvent {
    event_time: Option<String>,
    event_type: Option<EventType>,
    product_id: Option<i64>,
    user_id: Option<i64>,
    user_session: Option<String>,
    published_at: Option<DateTime<Utc>>,
    retry_count: Option<u32>,
    last_error: Option<String>,
    last_retry_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_event_time_round_trip() {
        let time = Utc.with_ymd_and_hms(2025, 1, 30, 10, 15, 0).unwrap();
        let formatted = format_event_time(time);
        assert_eq!(formatted, "2025-01-30 10:15:00");
        assert_eq!(parse_event_time(&formatted).unwrap(), time);
    }

    #[test]
    fn test_truncate_to_second() {
        let time = Utc.with_ymd_and_hms(2025, 1, 30, 10, 15, 0).unwrap()
            + chrono::Duration::microseconds(123_456);
        let truncated = truncate_to_second(time);
        assert_eq!(truncated.timestamp_subsec_micros(), 0);
    }

    #[test]
    fn test_event_type_rejects_unknown_literal() {
        assert!(EventType::parse("wishlist").is_err());
        assert_eq!(EventType::parse("purchase").unwrap(), EventType::Purchase);
    }

    #[test]
    fn test_envelope_serialization_matches_wire_format() {
        let time = Utc.with_ymd_and_hms(2025, 1, 30, 10, 15, 0).unwrap();
        let envelope = EventEnvelope::new(time, EventType::Purchase, 12345, 678, "s-abc");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(json["event_time"], "2025-01-30 10:15:00");
        assert_eq!(json["event_type"], "purchase");
        assert_eq!(json["product_id"], 12345);
        assert_eq!(json["user_id"], 678);
        assert_eq!(json["user_session"], "s-abc");
        // retry bookkeeping is absent on first publish
        assert!(json.get("last_error").is_none());
        assert!(json.get("failed_at").is_none());
    }

    #[test]
    fn test_parse_valid_body() {
        let body = br#"{"event_time":"2025-01-30 10:15:00","event_type":"view",
                        "product_id":7,"user_id":1,"user_session":"s-1"}"#;
        let envelope = EventEnvelope::parse(body).unwrap();
        assert_eq!(envelope.event_type, EventType::View);
        assert_eq!(envelope.product_id, 7);
        assert_eq!(envelope.retry_count, 0);
    }

    #[test]
    fn test_parse_defaults_time_and_session() {
        let body = br#"{"event_type":"cart","product_id":7,"user_id":1}"#;
        let envelope = EventEnvelope::parse(body).unwrap();
        assert_eq!(envelope.user_session, "");
        assert_eq!(envelope.event_time.timestamp_subsec_micros(), 0);
    }

    #[test]
    fn test_parse_rejects_malformed_json() {
        assert!(EventEnvelope::parse(b"not json").is_err());
    }

    #[test]
    fn test_parse_rejects_missing_required_fields() {
        let missing_user = br#"{"event_type":"view","product_id":7}"#;
        let err = EventEnvelope::parse(missing_user).unwrap_err();
        assert!(err.to_string().contains("user_id"));

        let missing_type = br#"{"product_id":7,"user_id":1}"#;
        assert!(EventEnvelope::parse(missing_type).is_err());
    }

    #[test]
    fn test_parse_preserves_retry_bookkeeping() {
        let body = br#"{"event_type":"view","product_id":7,"user_id":1,
                        "retry_count":2,"last_error":"graph failure: boom"}"#;
        let envelope = EventEnvelope::parse(body).unwrap();
        assert_eq!(envelope.retry_count, 2);
        assert_eq!(envelope.last_error.as_deref(), Some("graph failure: boom"));
    }
}

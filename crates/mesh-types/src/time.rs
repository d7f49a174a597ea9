//! Millisecond-precision time, per the design note replacing `date -d` shell
//! parsing with a single time abstraction.

use chrono::{DateTime, SecondsFormat, Utc};

/// Current time in milliseconds since the epoch.
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Render an epoch-millisecond timestamp as UTC millisecond ISO-8601
/// (`2026-07-28T12:34:56.789Z`), the wire format `Envelope.timestamp` uses.
pub fn to_iso8601_millis(epoch_ms: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(epoch_ms)
        .unwrap_or_else(|| DateTime::<Utc>::from_timestamp(0, 0).unwrap())
        .to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a millisecond ISO-8601 timestamp back into epoch milliseconds.
pub fn from_iso8601_millis(s: &str) -> Option<i64> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc).timestamp_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_iso8601() {
        let now = now_ms();
        let s = to_iso8601_millis(now);
        assert_eq!(from_iso8601_millis(&s), Some(now));
    }

    #[test]
    fn formats_with_millis_and_z_suffix() {
        let s = to_iso8601_millis(1_700_000_000_123);
        assert!(s.ends_with('Z'));
        assert!(s.contains('.'));
    }
}

//! Term bucketing: calendar-date slot keys in a configured system time zone
//! (spec §3 "term", §6 `SYSTEM_TIMEZONE`).

use chrono::{TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::CoreError;

/// `term = format_date(ms, SYSTEM_TZ)`, a `YYYY-MM-DD` string in `tz`.
pub fn term_for(ms: i64, tz: Tz) -> String {
    let utc = Utc.timestamp_millis_opt(ms).single().unwrap_or_else(Utc::now);
    utc.with_timezone(&tz).format("%Y-%m-%d").to_string()
}

/// `ts`, the seconds-since-epoch used in stored records (spec §4.5.2: "`ts`
/// is seconds-since-epoch derived from `ms / 1000`").
pub fn ts_seconds(ms: i64) -> i64 {
    ms.div_euclid(1000)
}

/// Parse `SYSTEM_TIMEZONE` (an IANA name, e.g. `"UTC"`, `"America/New_York"`).
pub fn parse_tz(name: &str) -> Result<Tz, CoreError> {
    name.parse::<Tz>()
        .map_err(|_| CoreError::InvalidId(format!("unknown time zone: {name}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buckets_by_utc_calendar_day() {
        // 2025-06-01T23:59:00Z
        let ms = 1_748_822_340_000;
        assert_eq!(term_for(ms, Tz::UTC), "2025-06-01");

        // 2025-06-02T00:01:00Z
        let ms2 = 1_748_822_460_000;
        assert_eq!(term_for(ms2, Tz::UTC), "2025-06-02");
    }

    #[test]
    fn ts_seconds_truncates() {
        assert_eq!(ts_seconds(1_748_822_340_999), 1_748_822_340);
    }
}

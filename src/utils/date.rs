use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::AppError;
use crate::utils::Timezone;

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, AppError> {
    let s = s.trim();
    // Try YYYYMMDD
    if s.len() == 8
        && let Ok(d) = NaiveDate::parse_from_str(s, "%Y%m%d")
    {
        return Ok(d);
    }
    // Try YYYY-MM-DD
    if let Ok(d) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(d);
    }
    Err(AppError::InvalidDate {
        input: s.to_string(),
    })
}

/// Parse a wall-clock time as stored by the datastore ("06:00", "06:00:00", "06:00:00.123")
pub(crate) fn parse_time(s: &str) -> Result<NaiveTime, AppError> {
    let s = s.trim();
    for fmt in ["%H:%M:%S%.f", "%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(s, fmt) {
            return Ok(t);
        }
    }
    Err(AppError::InvalidTime {
        input: s.to_string(),
    })
}

/// Parse a "now" override: RFC 3339 with offset, or a wall-clock instant in `timezone`
pub(crate) fn parse_instant(s: &str, timezone: Timezone) -> Result<DateTime<Utc>, AppError> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(timezone.resolve(naive));
        }
    }
    Err(AppError::InvalidInstant {
        input: s.to_string(),
    })
}

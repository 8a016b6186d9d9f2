use chrono::offset::LocalResult;
use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use std::str::FromStr;

use crate::consts::DEFAULT_TIMEZONE;
use crate::error::AppError;

/// Target timezone for every calendar computation; never the host zone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Timezone(Tz);

impl Timezone {
    pub(crate) fn parse(value: Option<&str>) -> Result<Self, AppError> {
        let trimmed = value.map(str::trim).unwrap_or_default();
        if trimmed.is_empty() {
            return Self::parse(Some(DEFAULT_TIMEZONE));
        }
        if trimmed.eq_ignore_ascii_case("utc") || trimmed.eq_ignore_ascii_case("z") {
            return Ok(Timezone(chrono_tz::UTC));
        }
        Tz::from_str(trimmed)
            .map(Timezone)
            .map_err(|_| AppError::InvalidTimezone {
                input: trimmed.to_string(),
            })
    }

    #[cfg(test)]
    pub(crate) fn tz(self) -> Tz {
        self.0
    }

    pub(crate) fn name(self) -> &'static str {
        self.0.name()
    }

    pub(crate) fn to_local(self, utc: DateTime<Utc>) -> DateTime<Tz> {
        utc.with_timezone(&self.0)
    }

    /// Resolve a wall-clock datetime in this zone to an instant.
    ///
    /// Ambiguous times (DST fall-back) take the earlier instant; times inside
    /// a DST gap move forward by the gap length.
    pub(crate) fn resolve(self, naive: NaiveDateTime) -> DateTime<Utc> {
        match self.0.from_local_datetime(&naive) {
            LocalResult::Single(dt) => dt.with_timezone(&Utc),
            LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
            LocalResult::None => {
                let shifted = naive + Duration::hours(1);
                self.0
                    .from_local_datetime(&shifted)
                    .earliest()
                    .map(|dt| dt.with_timezone(&Utc))
                    .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
            }
        }
    }
}

impl Default for Timezone {
    fn default() -> Self {
        Timezone(chrono_tz::Europe::Kyiv)
    }
}

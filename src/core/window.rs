//! Calendar- and shift-aligned reporting windows
//!
//! All boundaries are computed on local calendar dates in the target timezone
//! and only then resolved to instants, so week/month windows do not drift by
//! an hour across daylight-saving changes.

use chrono::{DateTime, Days, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::consts::{DEFAULT_EPOCH, DEFAULT_SHIFT_BOUNDARY};
use crate::error::ReportError;
use crate::utils::Timezone;

/// Length of one operational shift
pub(crate) const SHIFT_LENGTH: Duration = Duration::hours(24);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) enum WindowName {
    Day,
    Week,
    Month,
    All,
    CurrentShift,
    PreviousShift,
}

impl WindowName {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            WindowName::Day => "day",
            WindowName::Week => "week",
            WindowName::Month => "month",
            WindowName::All => "all",
            WindowName::CurrentShift => "currentShift",
            WindowName::PreviousShift => "previousShift",
        }
    }

    pub(crate) fn parse(input: &str) -> Result<Self, ReportError> {
        let normalized: String = input
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "day" => Ok(WindowName::Day),
            "week" => Ok(WindowName::Week),
            "month" => Ok(WindowName::Month),
            "all" => Ok(WindowName::All),
            "currentshift" => Ok(WindowName::CurrentShift),
            "previousshift" => Ok(WindowName::PreviousShift),
            _ => Err(ReportError::InvalidWindowName {
                input: input.to_string(),
            }),
        }
    }
}

impl fmt::Display for WindowName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the "day" window means
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum DayPolicy {
    /// The current shift, starting at the last shift boundary
    #[default]
    Shift,
    /// The last 24 rolling hours
    Rolling,
}

/// Half-open interval `[start, end)` with its day-granular projection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ReportWindow {
    pub(crate) name: WindowName,
    pub(crate) start: DateTime<Utc>,
    pub(crate) end: DateTime<Utc>,
    /// Local date of `start`
    pub(crate) first_date: NaiveDate,
    /// Local date of the last instant before `end`
    pub(crate) last_date: NaiveDate,
    /// Shift-aligned windows take daily rows from `first_date` only
    #[serde(skip)]
    shift_aligned: bool,
}

impl ReportWindow {
    fn new(
        name: WindowName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        timezone: Timezone,
    ) -> Result<Self, ReportError> {
        if start >= end {
            return Err(ReportError::EmptyWindow {
                name: name.to_string(),
            });
        }
        let last_instant = end - Duration::nanoseconds(1);
        Ok(ReportWindow {
            name,
            start,
            end,
            first_date: timezone.to_local(start).date_naive(),
            last_date: timezone.to_local(last_instant).date_naive(),
            shift_aligned: false,
        })
    }

    fn into_shift_aligned(self) -> Self {
        ReportWindow {
            shift_aligned: true,
            ..self
        }
    }

    pub(crate) fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.start <= instant && instant < self.end
    }

    /// Day-granular membership used for daily rollups.
    ///
    /// A shift spans two local dates but reports under the date it started
    /// on, so consecutive shifts never share a daily row.
    pub(crate) fn covers_date(&self, date: NaiveDate) -> bool {
        if self.shift_aligned {
            date == self.first_date
        } else {
            self.first_date <= date && date <= self.last_date
        }
    }

    /// Date a row dated `date` is reported under; a shift reports under its start date
    pub(crate) fn bucket_date(&self, date: NaiveDate) -> NaiveDate {
        if self.shift_aligned { self.first_date } else { date }
    }

    /// Local dates of the day-granular projection, oldest first
    pub(crate) fn dates(&self) -> impl Iterator<Item = NaiveDate> + use<> {
        let last = if self.shift_aligned {
            self.first_date
        } else {
            self.last_date
        };
        self.first_date.iter_days().take_while(move |d| *d <= last)
    }

    #[cfg(test)]
    pub(crate) fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Converts instants into local dates and reporting windows for one timezone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ShiftClock {
    timezone: Timezone,
    boundary: NaiveTime,
    day_policy: DayPolicy,
    epoch: NaiveDate,
}

impl Default for ShiftClock {
    fn default() -> Self {
        let (h, m) = DEFAULT_SHIFT_BOUNDARY;
        let (y, mo, d) = DEFAULT_EPOCH;
        ShiftClock {
            timezone: Timezone::default(),
            boundary: NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN),
            day_policy: DayPolicy::Shift,
            epoch: NaiveDate::from_ymd_opt(y, mo, d).unwrap_or(NaiveDate::MIN),
        }
    }
}

impl ShiftClock {
    pub(crate) fn new(
        timezone: Timezone,
        boundary: NaiveTime,
        day_policy: DayPolicy,
        epoch: NaiveDate,
    ) -> Self {
        ShiftClock {
            timezone,
            // sub-minute precision on the boundary is not meaningful
            boundary: boundary.with_nanosecond(0).unwrap_or(boundary),
            day_policy,
            epoch,
        }
    }

    pub(crate) fn timezone(&self) -> Timezone {
        self.timezone
    }

    pub(crate) fn boundary(&self) -> NaiveTime {
        self.boundary
    }

    pub(crate) fn day_policy(&self) -> DayPolicy {
        self.day_policy
    }

    pub(crate) fn epoch(&self) -> NaiveDate {
        self.epoch
    }

    pub(crate) fn local_date(&self, instant: DateTime<Utc>) -> NaiveDate {
        self.timezone.to_local(instant).date_naive()
    }

    #[cfg(test)]
    pub(crate) fn local_time(&self, instant: DateTime<Utc>) -> NaiveTime {
        self.timezone.to_local(instant).time()
    }

    /// Instant of a wall-clock date/time; a missing time means start of day
    pub(crate) fn instant_of(&self, date: NaiveDate, time: Option<NaiveTime>) -> DateTime<Utc> {
        self.timezone
            .resolve(date.and_time(time.unwrap_or(NaiveTime::MIN)))
    }

    /// Shift change instant on local date `date`
    pub(crate) fn shift_start_on(&self, date: NaiveDate) -> DateTime<Utc> {
        self.instant_of(date, Some(self.boundary))
    }

    /// Local date whose shift is running at `now`.
    ///
    /// The boundary instant itself still belongs to the closing shift.
    pub(crate) fn reporting_date(&self, now: DateTime<Utc>) -> NaiveDate {
        let local = self.timezone.to_local(now);
        let today = local.date_naive();
        if local.time() <= self.boundary {
            today.pred_opt().unwrap_or(today)
        } else {
            today
        }
    }

    pub(crate) fn current_shift(&self, now: DateTime<Utc>) -> ReportWindow {
        let start = self.shift_start_on(self.reporting_date(now));
        self.window_or_point(WindowName::CurrentShift, start, now)
    }

    pub(crate) fn previous_shift(&self, now: DateTime<Utc>) -> ReportWindow {
        let end = self.current_shift(now).start;
        self.window_or_point(WindowName::PreviousShift, end - SHIFT_LENGTH, end)
    }

    // Both shift windows are non-empty by construction; this only guards
    // against a DST resolution pushing the boundary past `now`.
    fn window_or_point(
        &self,
        name: WindowName,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ReportWindow {
        let start = start.min(end - Duration::seconds(1));
        ReportWindow::new(name, start, end, self.timezone)
            .unwrap_or(ReportWindow {
                name,
                start,
                end,
                first_date: self.local_date(start),
                last_date: self.local_date(end),
                shift_aligned: false,
            })
            .into_shift_aligned()
    }

    fn days_back_from(&self, now: DateTime<Utc>, days: u64) -> DateTime<Utc> {
        let today = self.local_date(now);
        let date = today.checked_sub_days(Days::new(days)).unwrap_or(today);
        self.instant_of(date, None)
    }

    /// Resolve a window request by name
    pub(crate) fn named_window(
        &self,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<ReportWindow, ReportError> {
        self.window(WindowName::parse(name)?, now)
    }

    pub(crate) fn window(
        &self,
        name: WindowName,
        now: DateTime<Utc>,
    ) -> Result<ReportWindow, ReportError> {
        let tz = self.timezone;
        match name {
            WindowName::Day => match self.day_policy {
                DayPolicy::Shift => Ok(ReportWindow {
                    name: WindowName::Day,
                    ..self.current_shift(now)
                }),
                DayPolicy::Rolling => {
                    ReportWindow::new(WindowName::Day, now - Duration::hours(24), now, tz)
                }
            },
            WindowName::Week => ReportWindow::new(name, self.days_back_from(now, 7), now, tz),
            WindowName::Month => ReportWindow::new(name, self.days_back_from(now, 30), now, tz),
            WindowName::All => ReportWindow::new(name, self.instant_of(self.epoch, None), now, tz),
            WindowName::CurrentShift => Ok(self.current_shift(now)),
            WindowName::PreviousShift => Ok(self.previous_shift(now)),
        }
    }
}

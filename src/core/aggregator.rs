//! Window-scoped aggregation of raw events and daily rollups
//!
//! One pass over the input fills every requested window at once, so disjoint
//! windows (current vs previous shift) never need a second scan.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::core::classify::{classify, classify_outcome};
use crate::core::types::{
    Category, CategorySet, CounterSet, DailySeries, Event, LabelCounts, ReportDiagnostics,
    RollupKind, RollupRow,
};
use crate::core::window::{ReportWindow, ShiftClock, WindowName};

/// Everything counted inside one window
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct WindowTally {
    pub(crate) window: ReportWindow,
    pub(crate) counters: CounterSet,
    pub(crate) directions: BTreeMap<Category, LabelCounts>,
    pub(crate) frequency_bands: BTreeMap<Category, LabelCounts>,
    pub(crate) crews: LabelCounts,
    /// Detections per reporting date, per category
    pub(crate) daily: BTreeMap<Category, DailySeries>,
}

impl WindowTally {
    fn new(window: ReportWindow, categories: &CategorySet) -> Self {
        WindowTally {
            window,
            counters: CounterSet::new(categories),
            directions: categories.iter().map(|c| (c, LabelCounts::new())).collect(),
            frequency_bands: categories.iter().map(|c| (c, LabelCounts::new())).collect(),
            crews: LabelCounts::new(),
            daily: categories
                .iter()
                .map(|c| (c, DailySeries::zeroed(window.dates())))
                .collect(),
        }
    }

    fn add_daily(&mut self, category: Category, date: NaiveDate, n: u64) {
        let date = self.window.bucket_date(date);
        if let Some(series) = self.daily.get_mut(&category) {
            series.add(date, n);
        }
    }

    fn add_label(
        map: &mut BTreeMap<Category, LabelCounts>,
        category: Category,
        label: &str,
        n: u64,
    ) {
        if let Some(counts) = map.get_mut(&category) {
            counts.add(label, n);
        }
    }
}

/// Non-empty trimmed label
fn label(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

/// Accumulator over a fixed set of windows and categories
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Aggregation {
    categories: CategorySet,
    tallies: Vec<WindowTally>,
    pub(crate) diagnostics: ReportDiagnostics,
}

impl Aggregation {
    pub(crate) fn new(windows: &[ReportWindow], categories: &CategorySet) -> Self {
        Aggregation {
            categories: categories.clone(),
            tallies: windows
                .iter()
                .map(|w| WindowTally::new(*w, categories))
                .collect(),
            diagnostics: ReportDiagnostics::default(),
        }
    }

    pub(crate) fn tally(&self, name: WindowName) -> Option<&WindowTally> {
        self.tallies.iter().find(|t| t.window.name == name)
    }

    #[cfg(test)]
    pub(crate) fn tallies(&self) -> &[WindowTally] {
        &self.tallies
    }

    #[cfg(test)]
    pub(crate) fn counters(&self) -> BTreeMap<WindowName, CounterSet> {
        self.tallies
            .iter()
            .map(|t| (t.window.name, t.counters.clone()))
            .collect()
    }

    /// Fold raw events. Rows without a date are skipped and counted; rows
    /// after `now` are excluded from every window.
    pub(crate) fn add_events<'a, I>(&mut self, events: I, clock: &ShiftClock, now: DateTime<Utc>)
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let before = self.diagnostics;
        for event in events {
            let Some(date) = event.occurred_date else {
                self.diagnostics.malformed_rows += 1;
                continue;
            };
            let instant = clock.instant_of(date, event.occurred_time);
            if instant > now {
                self.diagnostics.future_rows += 1;
                continue;
            }
            let category = classify(&event.category_raw);
            if !self.categories.contains(category) {
                continue;
            }
            let outcome = classify_outcome(&event.outcome_raw);
            let direction = label(event.direction.as_deref());
            let band = label(event.freq_band.as_deref());
            let crew = label(Some(event.category_raw.as_str()));

            for tally in self.tallies.iter_mut().filter(|t| t.window.contains(instant)) {
                tally.counters.record(category, outcome, 1);
                tally.add_daily(category, date, 1);
                if let Some(direction) = direction {
                    WindowTally::add_label(&mut tally.directions, category, direction, 1);
                }
                if let Some(band) = band {
                    WindowTally::add_label(&mut tally.frequency_bands, category, band, 1);
                }
                if let Some(crew) = crew {
                    tally.crews.add(crew, 1);
                }
            }
        }
        self.log_skipped("events", &before);
    }

    fn log_skipped(&self, what: &str, before: &ReportDiagnostics) {
        let malformed = self.diagnostics.malformed_rows - before.malformed_rows;
        let future = self.diagnostics.future_rows - before.future_rows;
        let unkeyed = self.diagnostics.unkeyed_rows - before.unkeyed_rows;
        if malformed + future + unkeyed > 0 {
            tracing::debug!(what, malformed, future, unkeyed, "skipped rows");
        }
    }

    /// Fold pre-aggregated daily rows, summing `daily_count` per key.
    ///
    /// Membership is tested on the row's date against each window's
    /// day-granular span; rows dated after today's local date are excluded.
    pub(crate) fn add_rollups<'a, I>(
        &mut self,
        kind: RollupKind,
        rows: I,
        clock: &ShiftClock,
        now: DateTime<Utc>,
    ) where
        I: IntoIterator<Item = &'a RollupRow>,
    {
        let today = clock.local_date(now);
        let before = self.diagnostics;
        for row in rows {
            let Some(date) = row.date else {
                self.diagnostics.malformed_rows += 1;
                continue;
            };
            if date > today {
                self.diagnostics.future_rows += 1;
                continue;
            }
            let key = label(row.key.as_deref());
            let category_text = match kind {
                RollupKind::Crew => row.category_raw.as_deref().or(key),
                _ => row.category_raw.as_deref(),
            };
            let category = classify(category_text.unwrap_or_default());
            if !self.categories.contains(category) {
                continue;
            }
            if key.is_none() && kind != RollupKind::Outcome {
                self.diagnostics.unkeyed_rows += 1;
                continue;
            }
            let n = row.daily_count;

            for tally in self.tallies.iter_mut().filter(|t| t.window.covers_date(date)) {
                match (kind, key) {
                    (RollupKind::Outcome, key) => {
                        let outcome = key.and_then(classify_outcome);
                        tally.counters.record(category, outcome, n);
                        tally.add_daily(category, date, n);
                    }
                    (RollupKind::Direction, Some(key)) => {
                        WindowTally::add_label(&mut tally.directions, category, key, n);
                    }
                    (RollupKind::FrequencyBand, Some(key)) => {
                        WindowTally::add_label(&mut tally.frequency_bands, category, key, n);
                    }
                    (RollupKind::Crew, Some(key)) => tally.crews.add(key, n),
                    (_, None) => {}
                }
            }
        }
        self.log_skipped(kind.as_str(), &before);
    }
}

/// Count raw events into every window in a single pass
pub(crate) fn aggregate_events(
    events: &[Event],
    windows: &[ReportWindow],
    categories: &CategorySet,
    clock: &ShiftClock,
    now: DateTime<Utc>,
) -> Aggregation {
    let mut aggregation = Aggregation::new(windows, categories);
    aggregation.add_events(events, clock, now);
    aggregation
}

/// Sum daily rollup rows into every window in a single pass
pub(crate) fn aggregate_rollups(
    kind: RollupKind,
    rows: &[RollupRow],
    windows: &[ReportWindow],
    categories: &CategorySet,
    clock: &ShiftClock,
    now: DateTime<Utc>,
) -> Aggregation {
    let mut aggregation = Aggregation::new(windows, categories);
    aggregation.add_rollups(kind, rows, clock, now);
    aggregation
}

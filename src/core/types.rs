//! Core data types shared by the classifier, aggregator and report facade

use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::error::AppError;

/// Platform classification of a flight event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) enum Category {
    Molniya,
    Fpv,
    Optic,
}

impl Category {
    pub(crate) const ALL: [Category; 3] = [Category::Molniya, Category::Fpv, Category::Optic];

    pub(crate) fn as_str(self) -> &'static str {
        match self {
            Category::Molniya => "MOLNIYA",
            Category::Fpv => "FPV",
            Category::Optic => "OPTIC",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == upper)
            .ok_or_else(|| AppError::InvalidCategory {
                input: s.trim().to_string(),
            })
    }
}

/// Disposition of an event. Every event is `Detected`; at most one other applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub(crate) enum Outcome {
    Detected,
    Destroyed,
    Suppressed,
    Lost,
    Strike,
}

impl Outcome {
    pub(crate) const ALL: [Outcome; 5] = [
        Outcome::Detected,
        Outcome::Destroyed,
        Outcome::Suppressed,
        Outcome::Lost,
        Outcome::Strike,
    ];
}

/// Categories a report is scoped to
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CategorySet(BTreeSet<Category>);

impl CategorySet {
    pub(crate) fn all() -> Self {
        CategorySet(Category::ALL.into_iter().collect())
    }

    pub(crate) fn contains(&self, category: Category) -> bool {
        self.0.contains(&category)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = Category> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<Category> for CategorySet {
    fn from_iter<I: IntoIterator<Item = Category>>(iter: I) -> Self {
        CategorySet(iter.into_iter().collect())
    }
}

/// Raw flight event as read from the datastore
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Event {
    /// Wall-clock date in the target timezone; `None` marks a malformed row
    pub(crate) occurred_date: Option<NaiveDate>,
    /// Wall-clock time; absent means start of day
    pub(crate) occurred_time: Option<NaiveTime>,
    /// Crew / platform free text
    pub(crate) category_raw: String,
    /// Action free text ("Збито БпЛА", "РЕБ", ...)
    pub(crate) outcome_raw: String,
    pub(crate) direction: Option<String>,
    pub(crate) freq_band: Option<String>,
    pub(crate) video_id: Option<String>,
}

/// Per-outcome counts for one category
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct OutcomeCounts {
    pub(crate) detected: u64,
    pub(crate) destroyed: u64,
    pub(crate) suppressed: u64,
    pub(crate) lost: u64,
    pub(crate) strike: u64,
}

impl OutcomeCounts {
    pub(crate) fn get(&self, outcome: Outcome) -> u64 {
        match outcome {
            Outcome::Detected => self.detected,
            Outcome::Destroyed => self.destroyed,
            Outcome::Suppressed => self.suppressed,
            Outcome::Lost => self.lost,
            Outcome::Strike => self.strike,
        }
    }

    fn slot(&mut self, outcome: Outcome) -> &mut u64 {
        match outcome {
            Outcome::Detected => &mut self.detected,
            Outcome::Destroyed => &mut self.destroyed,
            Outcome::Suppressed => &mut self.suppressed,
            Outcome::Lost => &mut self.lost,
            Outcome::Strike => &mut self.strike,
        }
    }

    /// Count `n` detections, `n` of which also resolved to `outcome`
    pub(crate) fn record(&mut self, outcome: Option<Outcome>, n: u64) {
        self.detected += n;
        if let Some(outcome) = outcome.filter(|o| *o != Outcome::Detected) {
            *self.slot(outcome) += n;
        }
    }

    /// Share of detections that were destroyed or suppressed, as a rounded percentage
    pub(crate) fn efficiency(&self) -> u32 {
        percent_of(self.destroyed + self.suppressed, self.detected)
    }

    /// `outcome` as a rounded percentage of detections
    pub(crate) fn share(&self, outcome: Outcome) -> u32 {
        percent_of(self.get(outcome), self.detected)
    }

    pub(crate) fn shares(&self) -> OutcomeShares {
        OutcomeShares {
            destroyed: self.share(Outcome::Destroyed),
            suppressed: self.share(Outcome::Suppressed),
            lost: self.share(Outcome::Lost),
            strike: self.share(Outcome::Strike),
        }
    }
}

fn percent_of(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

/// Each resolved outcome as a percentage of detections
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct OutcomeShares {
    pub(crate) destroyed: u32,
    pub(crate) suppressed: u32,
    pub(crate) lost: u32,
    pub(crate) strike: u32,
}

/// (Category, Outcome) -> count, zero-filled for the report's categories
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub(crate) struct CounterSet(BTreeMap<Category, OutcomeCounts>);

impl CounterSet {
    pub(crate) fn new(categories: &CategorySet) -> Self {
        CounterSet(
            categories
                .iter()
                .map(|c| (c, OutcomeCounts::default()))
                .collect(),
        )
    }

    /// Record into `category`; ignored when the category is outside the report
    pub(crate) fn record(&mut self, category: Category, outcome: Option<Outcome>, n: u64) {
        if let Some(counts) = self.0.get_mut(&category) {
            counts.record(outcome, n);
        }
    }

    pub(crate) fn get(&self, category: Category, outcome: Outcome) -> u64 {
        self.0.get(&category).map_or(0, |c| c.get(outcome))
    }

    pub(crate) fn category(&self, category: Category) -> Option<&OutcomeCounts> {
        self.0.get(&category)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = (Category, &OutcomeCounts)> + '_ {
        self.0.iter().map(|(c, counts)| (*c, counts))
    }

    pub(crate) fn efficiency(&self) -> BTreeMap<Category, u32> {
        self.0.iter().map(|(c, counts)| (*c, counts.efficiency())).collect()
    }

    pub(crate) fn shares(&self) -> BTreeMap<Category, OutcomeShares> {
        self.0.iter().map(|(c, counts)| (*c, counts.shares())).collect()
    }
}

/// Detections on one local date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct DailyCount {
    pub(crate) date: NaiveDate,
    pub(crate) count: u64,
}

/// Detections per local date, zero-filled over a fixed date range
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub(crate) struct DailySeries(Vec<DailyCount>);

impl DailySeries {
    /// One zero entry per date; `dates` must be ascending
    pub(crate) fn zeroed(dates: impl IntoIterator<Item = NaiveDate>) -> Self {
        DailySeries(
            dates
                .into_iter()
                .map(|date| DailyCount { date, count: 0 })
                .collect(),
        )
    }

    /// Add `n` on `date`; dates outside the range are ignored
    pub(crate) fn add(&mut self, date: NaiveDate, n: u64) {
        if let Ok(i) = self.0.binary_search_by_key(&date, |d| d.date) {
            self.0[i].count += n;
        }
    }

    pub(crate) fn days(&self) -> &[DailyCount] {
        &self.0
    }

    pub(crate) fn total(&self) -> u64 {
        self.0.iter().map(|d| d.count).sum()
    }
}

/// Label -> count accumulator that remembers first-seen order for tie-breaking
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct LabelCounts {
    entries: Vec<(String, u64)>,
    index: HashMap<String, usize>,
}

impl LabelCounts {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, label: &str, n: u64) {
        match self.index.get(label) {
            Some(&i) => self.entries[i].1 += n,
            None => {
                self.index.insert(label.to_string(), self.entries.len());
                self.entries.push((label.to_string(), n));
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn get(&self, label: &str) -> u64 {
        self.index.get(label).map_or(0, |&i| self.entries[i].1)
    }

    pub(crate) fn total(&self) -> u64 {
        self.entries.iter().map(|(_, n)| n).sum()
    }

    /// Entries in first-seen order
    pub(crate) fn entries(&self) -> &[(String, u64)] {
        &self.entries
    }
}

impl<S: AsRef<str>> FromIterator<(S, u64)> for LabelCounts {
    fn from_iter<I: IntoIterator<Item = (S, u64)>>(iter: I) -> Self {
        let mut counts = LabelCounts::new();
        for (label, n) in iter {
            counts.add(label.as_ref(), n);
        }
        counts
    }
}

/// One row of a top-N summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct GroupEntry {
    pub(crate) label: String,
    pub(crate) count: u64,
    pub(crate) share_percent: u32,
    /// True for the synthetic bucket folding the long tail
    pub(crate) is_other: bool,
}

/// Top-K entries plus at most one OTHER entry, count descending
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct GroupSummary {
    pub(crate) entries: Vec<GroupEntry>,
    /// Sum of all input counts, including those folded into OTHER
    pub(crate) total: u64,
}

impl GroupSummary {
    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn other(&self) -> Option<&GroupEntry> {
        self.entries.iter().find(|e| e.is_other)
    }
}

/// Secondary dimension of a pre-aggregated daily rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum RollupKind {
    /// keyed by outcome text
    Outcome,
    Direction,
    FrequencyBand,
    /// keyed by crew name; category derives from the crew name
    Crew,
}

impl RollupKind {
    pub(crate) fn as_str(self) -> &'static str {
        match self {
            RollupKind::Outcome => "outcome",
            RollupKind::Direction => "direction",
            RollupKind::FrequencyBand => "frequency band",
            RollupKind::Crew => "crew",
        }
    }
}

/// Pre-aggregated daily count keyed by (date, category, key)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct RollupRow {
    pub(crate) date: Option<NaiveDate>,
    pub(crate) category_raw: Option<String>,
    pub(crate) key: Option<String>,
    pub(crate) daily_count: u64,
}

/// Rows the aggregator could not use
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub(crate) struct ReportDiagnostics {
    /// Rows missing the mandatory date
    pub(crate) malformed_rows: u64,
    /// Rows dated after "now"
    pub(crate) future_rows: u64,
    /// Rollup rows without a usable key
    pub(crate) unkeyed_rows: u64,
}

impl ReportDiagnostics {
    pub(crate) fn add(&mut self, other: &ReportDiagnostics) {
        self.malformed_rows += other.malformed_rows;
        self.future_rows += other.future_rows;
        self.unkeyed_rows += other.unkeyed_rows;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // --- Category ---

    #[test]
    fn category_from_str_case_insensitive() {
        assert_eq!("molniya".parse::<Category>().unwrap(), Category::Molniya);
        assert_eq!(" FPV ".parse::<Category>().unwrap(), Category::Fpv);
        assert_eq!("Optic".parse::<Category>().unwrap(), Category::Optic);
        assert!("shahed".parse::<Category>().is_err());
    }

    // --- OutcomeCounts ---

    #[test]
    fn outcome_counts_record_detected_only() {
        let mut c = OutcomeCounts::default();
        c.record(None, 3);
        assert_eq!(c.detected, 3);
        assert_eq!(c.destroyed + c.suppressed + c.lost + c.strike, 0);
    }

    #[test]
    fn outcome_counts_record_with_outcome() {
        let mut c = OutcomeCounts::default();
        c.record(Some(Outcome::Lost), 2);
        assert_eq!(c.detected, 2);
        assert_eq!(c.lost, 2);
    }

    #[test]
    fn outcome_counts_detected_outcome_not_double_counted() {
        let mut c = OutcomeCounts::default();
        c.record(Some(Outcome::Detected), 1);
        assert_eq!(c.detected, 1);
    }

    #[test]
    fn efficiency_rounds_percentage() {
        let c = OutcomeCounts {
            detected: 3,
            destroyed: 1,
            suppressed: 1,
            lost: 1,
            strike: 0,
        };
        // 2/3 = 66.67%
        assert_eq!(c.efficiency(), 67);
    }

    #[test]
    fn efficiency_zero_when_nothing_detected() {
        assert_eq!(OutcomeCounts::default().efficiency(), 0);
        assert_eq!(OutcomeCounts::default().shares(), OutcomeShares::default());
    }

    #[test]
    fn shares_are_relative_to_detected() {
        let c = OutcomeCounts {
            detected: 8,
            destroyed: 3,
            suppressed: 1,
            lost: 2,
            strike: 0,
        };
        let shares = c.shares();
        // 3/8 = 37.5%
        assert_eq!(shares.destroyed, 38);
        assert_eq!(shares.suppressed, 13);
        assert_eq!(shares.lost, 25);
        assert_eq!(shares.strike, 0);
        assert_eq!(c.share(Outcome::Detected), 100);
    }

    // --- CounterSet ---

    #[test]
    fn counter_set_zero_filled_for_requested_categories() {
        let cats: CategorySet = [Category::Molniya, Category::Fpv].into_iter().collect();
        let set = CounterSet::new(&cats);
        assert_eq!(set.iter().count(), 2);
        for outcome in Outcome::ALL {
            assert_eq!(set.get(Category::Molniya, outcome), 0);
        }
        assert!(set.category(Category::Optic).is_none());
    }

    #[test]
    fn counter_set_ignores_foreign_category() {
        let cats: CategorySet = [Category::Fpv].into_iter().collect();
        let mut set = CounterSet::new(&cats);
        set.record(Category::Optic, Some(Outcome::Destroyed), 1);
        assert_eq!(set.get(Category::Optic, Outcome::Detected), 0);
        assert_eq!(set.get(Category::Fpv, Outcome::Detected), 0);
    }

    #[test]
    fn counter_set_serializes_by_category_name() {
        let cats: CategorySet = [Category::Molniya].into_iter().collect();
        let mut set = CounterSet::new(&cats);
        set.record(Category::Molniya, Some(Outcome::Strike), 1);
        let json = serde_json::to_value(&set).unwrap();
        assert_eq!(json["MOLNIYA"]["detected"], 1);
        assert_eq!(json["MOLNIYA"]["strike"], 1);
    }

    // --- DailySeries ---

    #[test]
    fn daily_series_is_zero_filled_and_ignores_outside_dates() {
        let d = |day| NaiveDate::from_ymd_opt(2025, 1, day).unwrap();
        let mut series = DailySeries::zeroed(d(3).iter_days().take(3));
        series.add(d(4), 2);
        series.add(d(4), 1);
        series.add(d(9), 5);
        let counts: Vec<u64> = series.days().iter().map(|c| c.count).collect();
        assert_eq!(counts, [0, 3, 0]);
        assert_eq!(series.total(), 3);
        let json = serde_json::to_value(&series).unwrap();
        assert_eq!(json[1]["date"], "2025-01-04");
        assert_eq!(json[1]["count"], 3);
    }

    // --- LabelCounts ---

    #[test]
    fn label_counts_keep_first_seen_order() {
        let mut counts = LabelCounts::new();
        counts.add("north", 1);
        counts.add("east", 2);
        counts.add("north", 4);
        let labels: Vec<&str> = counts.entries().iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, ["north", "east"]);
        assert_eq!(counts.get("north"), 5);
        assert_eq!(counts.total(), 7);
        assert_eq!(counts.get("west"), 0);
    }
}

//! Report facade: fetch, aggregate, rank
//!
//! Every build fetches fresh rows and allocates fresh counters, so a build is
//! a pure function of (source contents, categories, window, now).

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, instrument, warn};

use crate::config::CounterBasis;
use crate::consts::{DEFAULT_TOP_CREWS, DEFAULT_TOP_DIRECTIONS, DEFAULT_TOP_FREQUENCY_BANDS};
use crate::core::aggregator::{WindowTally, aggregate_events, aggregate_rollups};
use crate::core::topn::reduce;
use crate::core::types::{
    Category, CategorySet, CounterSet, DailySeries, Event, GroupSummary, LabelCounts,
    OutcomeShares, ReportDiagnostics, RollupKind, RollupRow,
};
use crate::core::window::{ReportWindow, ShiftClock, WindowName};
use crate::error::{FetchError, ReportError};
use crate::source::{EventQuery, SharedSource, SortOrder};

/// Ranking sizes and counter basis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReportOptions {
    pub(crate) top_directions: usize,
    pub(crate) top_frequency_bands: usize,
    pub(crate) top_crews: usize,
    pub(crate) counter_basis: CounterBasis,
}

impl Default for ReportOptions {
    fn default() -> Self {
        ReportOptions {
            top_directions: DEFAULT_TOP_DIRECTIONS,
            top_frequency_bands: DEFAULT_TOP_FREQUENCY_BANDS,
            top_crews: DEFAULT_TOP_CREWS,
            counter_basis: CounterBasis::Events,
        }
    }
}

/// Counters and efficiency for one window
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct WindowReport {
    pub(crate) window: ReportWindow,
    pub(crate) counters: CounterSet,
    /// Percent of detections destroyed or suppressed, per category
    pub(crate) efficiency: BTreeMap<Category, u32>,
    /// Each outcome as a percent of detections, per category
    pub(crate) shares: BTreeMap<Category, OutcomeShares>,
}

impl WindowReport {
    fn from_tally(tally: &WindowTally) -> Self {
        WindowReport {
            window: tally.window,
            counters: tally.counters.clone(),
            efficiency: tally.counters.efficiency(),
            shares: tally.counters.shares(),
        }
    }
}

/// Finished numbers for rendering
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Report {
    pub(crate) generated_at: DateTime<Utc>,
    pub(crate) timezone: String,
    pub(crate) window: WindowReport,
    pub(crate) current_shift: WindowReport,
    pub(crate) previous_shift: WindowReport,
    /// Rankings below cover the requested window
    pub(crate) top_directions: BTreeMap<Category, GroupSummary>,
    pub(crate) top_frequency_bands: BTreeMap<Category, GroupSummary>,
    pub(crate) top_crews: GroupSummary,
    /// Detections per local date across the requested window
    pub(crate) daily: BTreeMap<Category, DailySeries>,
    pub(crate) diagnostics: ReportDiagnostics,
}

/// Rows feeding the counters, per `CounterBasis`
enum CounterRows {
    Events(Vec<Event>),
    Outcomes(Vec<RollupRow>),
}

pub(crate) struct ReportFacade {
    source: SharedSource,
    clock: ShiftClock,
    options: ReportOptions,
}

impl ReportFacade {
    pub(crate) fn new(source: SharedSource, clock: ShiftClock, options: ReportOptions) -> Self {
        ReportFacade {
            source,
            clock,
            options,
        }
    }

    /// Resolve the requested window plus both shift windows, without duplicates
    fn windows(
        &self,
        window_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<ReportWindow>, ReportError> {
        let requested = self.clock.named_window(window_name, now)?;
        let mut windows = vec![requested];
        for shift in [self.clock.current_shift(now), self.clock.previous_shift(now)] {
            if shift.name != requested.name {
                windows.push(shift);
            }
        }
        Ok(windows)
    }

    async fn fetch_counter_rows(
        &self,
        since: Option<NaiveDate>,
    ) -> Result<CounterRows, FetchError> {
        match self.options.counter_basis {
            CounterBasis::Events => {
                let query = EventQuery {
                    since,
                    order: SortOrder::Ascending,
                };
                self.source.fetch_events(query).await.map(CounterRows::Events)
            }
            CounterBasis::Rollups => self
                .source
                .fetch_rollups(RollupKind::Outcome, since)
                .await
                .map(CounterRows::Outcomes),
        }
    }

    #[instrument(skip(self, categories), fields(source = self.source.display_name()))]
    pub(crate) async fn build_report(
        &self,
        categories: &CategorySet,
        window_name: &str,
        now: DateTime<Utc>,
    ) -> Result<Report, ReportError> {
        let windows = self.windows(window_name, now)?;
        let requested = windows[0].name;
        // never trust the source to pre-filter; this is only the fetch scope
        let since = windows.iter().map(|w| w.first_date).min();
        debug!(?since, windows = windows.len(), "fetching");

        let source = &self.source;
        let (counter_rows, directions, bands, crews) = tokio::try_join!(
            self.fetch_counter_rows(since),
            source.fetch_rollups(RollupKind::Direction, since),
            source.fetch_rollups(RollupKind::FrequencyBand, since),
            source.fetch_rollups(RollupKind::Crew, since),
        )?;

        let clock = &self.clock;
        let counts = match &counter_rows {
            CounterRows::Events(events) => {
                aggregate_events(events, &windows, categories, clock, now)
            }
            CounterRows::Outcomes(rows) => {
                aggregate_rollups(RollupKind::Outcome, rows, &windows, categories, clock, now)
            }
        };

        // rankings only cover the requested window
        let mut rankings = aggregate_rollups(
            RollupKind::Direction,
            &directions,
            &windows[..1],
            categories,
            clock,
            now,
        );
        rankings.add_rollups(RollupKind::FrequencyBand, &bands, &self.clock, now);
        rankings.add_rollups(RollupKind::Crew, &crews, &self.clock, now);

        let mut diagnostics = counts.diagnostics;
        diagnostics.add(&rankings.diagnostics);
        if diagnostics.malformed_rows + diagnostics.unkeyed_rows > 0 {
            warn!(
                malformed = diagnostics.malformed_rows,
                unkeyed = diagnostics.unkeyed_rows,
                "skipped unusable rows"
            );
        }
        debug!(future = diagnostics.future_rows, "aggregated");

        let window_report = |name: WindowName| -> Result<WindowReport, ReportError> {
            counts
                .tally(name)
                .map(WindowReport::from_tally)
                .ok_or_else(|| ReportError::EmptyWindow {
                    name: name.to_string(),
                })
        };
        let window = window_report(requested)?;
        let daily = counts
            .tally(requested)
            .map(|t| t.daily.clone())
            .unwrap_or_default();
        let current_shift = window_report(WindowName::CurrentShift)?;
        let previous_shift = window_report(WindowName::PreviousShift)?;

        let ranked = rankings.tally(requested);
        let top_directions = rank(
            categories,
            ranked.map(|t| &t.directions),
            self.options.top_directions,
        );
        let top_frequency_bands = rank(
            categories,
            ranked.map(|t| &t.frequency_bands),
            self.options.top_frequency_bands,
        );
        let empty = LabelCounts::new();
        let top_crews = reduce(ranked.map_or(&empty, |t| &t.crews), self.options.top_crews);

        Ok(Report {
            generated_at: now,
            timezone: self.clock.timezone().name().to_string(),
            window,
            current_shift,
            previous_shift,
            top_directions,
            top_frequency_bands,
            top_crews,
            daily,
            diagnostics,
        })
    }
}

fn rank(
    categories: &CategorySet,
    labels: Option<&BTreeMap<Category, LabelCounts>>,
    k: usize,
) -> BTreeMap<Category, GroupSummary> {
    let empty = LabelCounts::new();
    categories
        .iter()
        .map(|c| {
            let counts = labels.and_then(|m| m.get(&c)).unwrap_or(&empty);
            (c, reduce(counts, k))
        })
        .collect()
}

/// Ticket of one report request, ordered by issue time
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct RequestTicket(u64);

/// Last-write-wins gate for overlapping report builds.
///
/// A result is shown only if no newer request has already been shown, so a
/// slow stale build can never overwrite a fresher one.
#[derive(Debug, Default)]
pub(crate) struct RequestSequencer {
    issued: AtomicU64,
    accepted: AtomicU64,
}

impl RequestSequencer {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next_ticket(&self) -> RequestTicket {
        RequestTicket(self.issued.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// True if `ticket` is newer than everything accepted so far; records it
    pub(crate) fn accept(&self, ticket: RequestTicket) -> bool {
        self.accepted.fetch_max(ticket.0, Ordering::SeqCst) < ticket.0
    }

    /// True if a newer ticket has been issued since `ticket`
    pub(crate) fn is_superseded(&self, ticket: RequestTicket) -> bool {
        self.issued.load(Ordering::SeqCst) > ticket.0
    }
}

//! Core module - classification, windows, aggregation and reporting

mod aggregator;
mod classify;
mod report;
mod topn;
mod types;
mod window;

pub(crate) use report::{Report, ReportFacade, ReportOptions, RequestSequencer, WindowReport};
pub(crate) use types::{
    Category, CategorySet, CounterSet, DailySeries, Event, GroupSummary, Outcome, OutcomeCounts,
    RollupKind, RollupRow,
};
pub(crate) use window::{DayPolicy, ReportWindow, ShiftClock};

#[cfg(test)]
pub(crate) use types::{GroupEntry, ReportDiagnostics};
#[cfg(test)]
pub(crate) use window::WindowName;

use serde::Serialize;
use std::collections::BTreeMap;

use crate::core::{Category, DailySeries, GroupSummary, Report, ReportWindow, WindowReport};
use crate::error::AppError;

#[derive(Serialize)]
struct ShiftOutput<'a> {
    timezone: &'a str,
    current_shift: &'a WindowReport,
    previous_shift: &'a WindowReport,
}

#[derive(Serialize)]
struct RankingsOutput<'a> {
    timezone: &'a str,
    window: &'a WindowReport,
    top_directions: &'a BTreeMap<Category, GroupSummary>,
    top_frequency_bands: &'a BTreeMap<Category, GroupSummary>,
    top_crews: &'a GroupSummary,
}

#[derive(Serialize)]
struct DailyOutput<'a> {
    timezone: &'a str,
    window: &'a ReportWindow,
    daily: &'a BTreeMap<Category, DailySeries>,
}

pub(crate) fn report_json(report: &Report) -> Result<String, AppError> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub(crate) fn shift_json(report: &Report) -> Result<String, AppError> {
    let output = ShiftOutput {
        timezone: &report.timezone,
        current_shift: &report.current_shift,
        previous_shift: &report.previous_shift,
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

pub(crate) fn rankings_json(report: &Report) -> Result<String, AppError> {
    let output = RankingsOutput {
        timezone: &report.timezone,
        window: &report.window,
        top_directions: &report.top_directions,
        top_frequency_bands: &report.top_frequency_bands,
        top_crews: &report.top_crews,
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

pub(crate) fn daily_json(report: &Report) -> Result<String, AppError> {
    let output = DailyOutput {
        timezone: &report.timezone,
        window: &report.window.window,
        daily: &report.daily,
    };
    Ok(serde_json::to_string_pretty(&output)?)
}

use comfy_table::{Cell, Color, Table};
use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::consts::DATE_FORMAT;
use crate::core::{
    Category, CounterSet, DailySeries, GroupSummary, Outcome, OutcomeCounts, Report, WindowReport,
};
use crate::output::format::{
    create_styled_table, efficiency_color, format_delta, format_number, format_percent,
    format_window, header_cell, right_cell, styled_cell,
};
use crate::utils::Timezone;

const TOTAL_LABEL: &str = "TOTAL";

fn outcome_header(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Detected => "Detected",
        Outcome::Destroyed => "Destroyed",
        Outcome::Suppressed => "Suppressed",
        Outcome::Lost => "Lost",
        Outcome::Strike => "Strike",
    }
}

fn totals(counters: &CounterSet) -> OutcomeCounts {
    counters
        .iter()
        .fold(OutcomeCounts::default(), |mut acc, (_, c)| {
            acc.detected += c.detected;
            acc.destroyed += c.destroyed;
            acc.suppressed += c.suppressed;
            acc.lost += c.lost;
            acc.strike += c.strike;
            acc
        })
}

fn counter_row(label: &str, counts: &OutcomeCounts, bold: bool, use_color: bool) -> Vec<Cell> {
    let label_color = if use_color && bold { Some(Color::Yellow) } else { None };
    let mut row = vec![styled_cell(label, label_color, bold)];
    for outcome in Outcome::ALL {
        let n = format_number(counts.get(outcome));
        let text = match outcome {
            Outcome::Detected => n,
            _ => format!("{n} ({})", format_percent(counts.share(outcome))),
        };
        row.push(right_cell(&text, None, bold));
    }
    let eff = counts.efficiency();
    row.push(right_cell(&format_percent(eff), efficiency_color(eff, use_color), bold));
    row
}

/// Counters and efficiency per category, with a TOTAL row
fn counters_table(window: &WindowReport, use_color: bool) -> Table {
    let mut table = create_styled_table();
    let mut header = vec![header_cell("Category", use_color)];
    header.extend(Outcome::ALL.map(|o| header_cell(outcome_header(o), use_color)));
    header.push(header_cell("Efficiency", use_color));
    table.set_header(header);

    for (category, counts) in window.counters.iter() {
        table.add_row(counter_row(category.as_str(), counts, false, use_color));
    }
    if window.counters.iter().count() > 1 {
        table.add_row(counter_row(TOTAL_LABEL, &totals(&window.counters), true, use_color));
    }
    table
}

/// Current vs previous shift, one row per category and outcome
fn shift_table(report: &Report, use_color: bool) -> Table {
    let mut table = create_styled_table();
    table.set_header(vec![
        header_cell("Category", use_color),
        header_cell("Outcome", use_color),
        header_cell("Current", use_color),
        header_cell("Previous", use_color),
        header_cell("Δ", use_color),
    ]);

    let current = &report.current_shift.counters;
    let previous = &report.previous_shift.counters;
    for (category, counts) in current.iter() {
        for outcome in Outcome::ALL {
            let cur = counts.get(outcome);
            let prev = previous.get(category, outcome);
            let delta_color = match (use_color, cur.cmp(&prev)) {
                (false, _) | (_, std::cmp::Ordering::Equal) => None,
                (true, std::cmp::Ordering::Greater) => Some(Color::Green),
                (true, std::cmp::Ordering::Less) => Some(Color::Red),
            };
            table.add_row(vec![
                Cell::new(category.as_str()),
                Cell::new(outcome_header(outcome)),
                right_cell(&format_number(cur), None, false),
                right_cell(&format_number(prev), None, false),
                right_cell(&format_delta(cur, prev), delta_color, false),
            ]);
        }
        let cur = counts.efficiency();
        let prev = previous.category(category).map_or(0, OutcomeCounts::efficiency);
        table.add_row(vec![
            styled_cell(category.as_str(), None, true),
            styled_cell("Efficiency", None, true),
            right_cell(&format_percent(cur), efficiency_color(cur, use_color), true),
            right_cell(&format_percent(prev), efficiency_color(prev, use_color), true),
            right_cell(&format_delta(u64::from(cur), u64::from(prev)), None, true),
        ]);
    }
    table
}

fn ranking_table(summary: &GroupSummary, use_color: bool) -> Table {
    let mut table = create_styled_table();
    table.set_header(vec![
        header_cell("#", use_color),
        header_cell("Label", use_color),
        header_cell("Count", use_color),
        header_cell("Share", use_color),
    ]);
    let mut rank = 0;
    for entry in &summary.entries {
        let dim = if use_color && entry.is_other { Some(Color::DarkGrey) } else { None };
        let rank_text = if entry.is_other {
            String::new()
        } else {
            rank += 1;
            rank.to_string()
        };
        table.add_row(vec![
            right_cell(&rank_text, dim, false),
            styled_cell(&entry.label, dim, false),
            right_cell(&format_number(entry.count), dim, false),
            right_cell(&format_percent(entry.share_percent), dim, false),
        ]);
    }
    table
}

/// One row per date, one column per category
fn daily_table(daily: &BTreeMap<Category, DailySeries>, use_color: bool) -> Table {
    let mut table = create_styled_table();
    let mut header = vec![header_cell("Date", use_color)];
    header.extend(daily.keys().map(|c| header_cell(c.as_str(), use_color)));
    table.set_header(header);

    let Some(first) = daily.values().next() else {
        return table;
    };
    for (i, day) in first.days().iter().enumerate() {
        let mut row = vec![Cell::new(day.date.format(DATE_FORMAT))];
        for series in daily.values() {
            let n = series.days().get(i).map_or(0, |d| d.count);
            row.push(right_cell(&format_number(n), None, false));
        }
        table.add_row(row);
    }
    let mut total = vec![styled_cell(TOTAL_LABEL, None, true)];
    total.extend(
        daily
            .values()
            .map(|s| right_cell(&format_number(s.total()), None, true)),
    );
    table.add_row(total);
    table
}

fn push_ranking(out: &mut String, title: &str, summary: &GroupSummary, use_color: bool) {
    let _ = writeln!(out, "\n  {title}");
    if summary.is_empty() {
        let _ = writeln!(out, "  (no data)");
    } else {
        let _ = writeln!(out, "{}", ranking_table(summary, use_color));
    }
}

fn push_category_rankings(
    out: &mut String,
    title: &str,
    rankings: &BTreeMap<Category, GroupSummary>,
    use_color: bool,
) {
    for (category, summary) in rankings {
        push_ranking(out, &format!("{title} · {category}"), summary, use_color);
    }
}

fn push_window_title(out: &mut String, label: &str, window: &WindowReport, timezone: Timezone) {
    let _ = writeln!(
        out,
        "\n  {label} {} ({}, {})",
        window.window.name,
        format_window(&window.window, timezone),
        timezone.name()
    );
}

fn report_timezone(report: &Report) -> Timezone {
    Timezone::parse(Some(&report.timezone)).unwrap_or_default()
}

fn push_diagnostics(out: &mut String, report: &Report) {
    let d = &report.diagnostics;
    if d.malformed_rows + d.unkeyed_rows + d.future_rows > 0 {
        let _ = writeln!(
            out,
            "\n  skipped rows: {} malformed, {} unkeyed, {} future",
            format_number(d.malformed_rows),
            format_number(d.unkeyed_rows),
            format_number(d.future_rows)
        );
    }
}

pub(crate) fn render_report(report: &Report, use_color: bool) -> String {
    let tz = report_timezone(report);
    let mut out = String::new();
    push_window_title(&mut out, "Window", &report.window, tz);
    let _ = writeln!(out, "{}", counters_table(&report.window, use_color));
    out.push_str(&render_daily(report, use_color));
    out.push_str(&render_shift(report, use_color));
    out.push_str(&render_rankings(report, use_color));
    push_diagnostics(&mut out, report);
    out
}

pub(crate) fn render_daily(report: &Report, use_color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n  Daily detections · {}", report.window.window.name);
    let _ = writeln!(out, "{}", daily_table(&report.daily, use_color));
    out
}

pub(crate) fn render_shift(report: &Report, use_color: bool) -> String {
    let tz = report_timezone(report);
    let mut out = String::new();
    push_window_title(&mut out, "Shift", &report.current_shift, tz);
    push_window_title(&mut out, "vs", &report.previous_shift, tz);
    let _ = writeln!(out, "{}", shift_table(report, use_color));
    out
}

pub(crate) fn render_rankings(report: &Report, use_color: bool) -> String {
    let mut out = String::new();
    push_category_rankings(&mut out, "Top directions", &report.top_directions, use_color);
    push_category_rankings(
        &mut out,
        "Top frequency bands",
        &report.top_frequency_bands,
        use_color,
    );
    push_ranking(&mut out, "Top crews", &report.top_crews, use_color);
    out
}

pub(crate) fn print_report_table(report: &Report, use_color: bool) {
    print!("{}", render_report(report, use_color));
}

pub(crate) fn print_daily_table(report: &Report, use_color: bool) {
    print!("{}", render_daily(report, use_color));
}

pub(crate) fn print_shift_table(report: &Report, use_color: bool) {
    print!("{}", render_shift(report, use_color));
}

pub(crate) fn print_rankings_table(report: &Report, use_color: bool) {
    print!("{}", render_rankings(report, use_color));
}

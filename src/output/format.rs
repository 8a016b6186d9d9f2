use comfy_table::{
    Attribute, Cell, CellAlignment, Color, ContentArrangement, Table, TableComponent,
    modifiers::UTF8_SOLID_INNER_BORDERS, presets::UTF8_FULL,
};

use crate::consts::DATETIME_FORMAT;
use crate::core::ReportWindow;
use crate::utils::Timezone;

pub(super) fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut result = String::new();
    for (i, c) in digits.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

pub(super) fn format_percent(p: u32) -> String {
    format!("{p}%")
}

/// Signed difference, "+3" / "-2" / "0"
pub(super) fn format_delta(current: u64, previous: u64) -> String {
    if current >= previous {
        let d = current - previous;
        if d == 0 { "0".to_string() } else { format!("+{}", format_number(d)) }
    } else {
        format!("-{}", format_number(previous - current))
    }
}

/// "2025-01-10 04:40 → 2025-01-10 10:00" in the target timezone
pub(super) fn format_window(window: &ReportWindow, timezone: Timezone) -> String {
    format!(
        "{} → {}",
        timezone.to_local(window.start).format(DATETIME_FORMAT),
        timezone.to_local(window.end).format(DATETIME_FORMAT)
    )
}

pub(super) fn styled_cell(text: &str, color: Option<Color>, bold: bool) -> Cell {
    let mut cell = Cell::new(text);
    if let Some(c) = color {
        cell = cell.fg(c);
    }
    if bold {
        cell = cell.add_attribute(Attribute::Bold);
    }
    cell
}

pub(super) fn header_cell(text: &str, use_color: bool) -> Cell {
    let mut cell = Cell::new(text).add_attribute(Attribute::Bold);
    if use_color {
        cell = cell.fg(Color::Cyan);
    }
    cell
}

/// Replace the double-line header separator (╞═╪═╡) with single-line (├─┼─┤)
fn normalize_header_separator(table: &mut Table) {
    table.set_style(TableComponent::HeaderLines, '─');
    table.set_style(TableComponent::LeftHeaderIntersection, '├');
    table.set_style(TableComponent::MiddleHeaderIntersections, '┼');
    table.set_style(TableComponent::RightHeaderIntersection, '┤');
}

/// Create a table with the standard preset, inner borders, and normalized header separator.
pub(super) fn create_styled_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic);
    normalize_header_separator(&mut table);
    table
}

pub(super) fn right_cell(text: &str, color: Option<Color>, bold: bool) -> Cell {
    let mut cell = Cell::new(text).set_alignment(CellAlignment::Right);
    if let Some(c) = color {
        cell = cell.fg(c);
    }
    if bold {
        cell = cell.add_attribute(Attribute::Bold);
    }
    cell
}

/// Green at or above 70%, yellow from 40%, red below
pub(super) fn efficiency_color(p: u32, use_color: bool) -> Option<Color> {
    if !use_color {
        return None;
    }
    Some(match p {
        70.. => Color::Green,
        40..=69 => Color::Yellow,
        _ => Color::Red,
    })
}

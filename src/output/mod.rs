mod format;
mod json;
mod table;

pub(crate) use json::{daily_json, rankings_json, report_json, shift_json};
pub(crate) use table::{
    print_daily_table, print_rankings_table, print_report_table, print_shift_table,
};

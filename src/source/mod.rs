//! Data source abstraction layer
//!
//! The report facade only talks to these traits. Each backend (JSONL
//! exports, SQLite, a PostgREST endpoint, an in-memory store) implements all
//! three so it can be handed around as one `DataSource`.

pub(crate) mod jsonl;
#[cfg(test)]
pub(crate) mod memory;
pub(crate) mod poll;
pub(crate) mod registry;
pub(crate) mod rest;
pub(crate) mod sqlite;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use tokio::sync::broadcast;

use crate::core::{Event, RollupKind, RollupRow};
use crate::error::FetchError;
use crate::utils::parse_time;

/// Ordering of fetched events by (date, time)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Filter passed to an event source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EventQuery {
    /// Inclusive date lower bound; `None` fetches everything
    pub(crate) since: Option<NaiveDate>,
    pub(crate) order: SortOrder,
}

/// Raw flight events
#[async_trait]
pub(crate) trait EventSource: Send + Sync {
    /// Display name for logs and table titles
    fn display_name(&self) -> &str;

    async fn fetch_events(&self, query: EventQuery) -> Result<Vec<Event>, FetchError>;
}

/// Pre-aggregated daily counts
#[async_trait]
pub(crate) trait RollupSource: Send + Sync {
    async fn fetch_rollups(
        &self,
        kind: RollupKind,
        since: Option<NaiveDate>,
    ) -> Result<Vec<RollupRow>, FetchError>;
}

/// Payload-less "data changed" ticks
pub(crate) trait ChangeFeed: Send + Sync {
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// Everything a report needs from one backend
pub(crate) trait DataSource: EventSource + RollupSource + ChangeFeed {}

impl<T: EventSource + RollupSource + ChangeFeed> DataSource for T {}

pub(crate) use registry::{SharedSource, open_source};

// ============================================================================
// Wire rows shared by the JSONL and REST backends
// ============================================================================

/// One row of the `flights` table or a JSONL export line
#[derive(Debug, Default, Deserialize)]
pub(crate) struct FlightRow {
    #[serde(default, alias = "flight_date")]
    date: Option<String>,
    #[serde(default, alias = "flight_time")]
    time: Option<String>,
    #[serde(default)]
    crew: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default, alias = "to_t")]
    direction: Option<String>,
    #[serde(default, alias = "freq_range", alias = "freq")]
    freq_band: Option<String>,
    #[serde(default)]
    video: Option<String>,
}

/// Leading `YYYY-MM-DD` of a date or timestamp string
pub(crate) fn parse_row_date(raw: &str) -> Option<NaiveDate> {
    let head = raw.trim().get(..10)?;
    NaiveDate::parse_from_str(head, crate::consts::DATE_FORMAT).ok()
}

impl FlightRow {
    /// An unparseable date is kept as `None` so the aggregator can count it
    pub(crate) fn into_event(self) -> Event {
        Event {
            occurred_date: self.date.as_deref().and_then(parse_row_date),
            occurred_time: self
                .time
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .and_then(|t| parse_time(t).ok()),
            category_raw: self.crew.unwrap_or_default(),
            outcome_raw: self.action.unwrap_or_default(),
            direction: self.direction,
            freq_band: self.freq_band,
            video_id: self.video,
        }
    }
}

/// Accepts `12`, `12.0` or `"12"`; anything else counts as zero
pub(crate) fn count_from_number_or_string<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    let count = match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    Ok(count.unwrap_or(0))
}

// ============================================================================
// Helpers shared by backends
// ============================================================================

/// Apply an `EventQuery` to already loaded events.
///
/// Dateless rows are kept so the aggregator can report them.
pub(crate) fn apply_query(mut events: Vec<Event>, query: EventQuery) -> Vec<Event> {
    if let Some(since) = query.since {
        events.retain(|e| e.occurred_date.is_none_or(|d| d >= since));
    }
    events.sort_by(|a, b| {
        let key_a = (a.occurred_date.is_none(), a.occurred_date, a.occurred_time);
        let key_b = (b.occurred_date.is_none(), b.occurred_date, b.occurred_time);
        key_a.cmp(&key_b)
    });
    if query.order == SortOrder::Descending {
        // dateless rows stay last
        let split = events.partition_point(|e| e.occurred_date.is_some());
        events[..split].reverse();
    }
    events
}

fn rollup_key(event: &Event, kind: RollupKind) -> (Option<String>, Option<String>) {
    let crew = Some(event.category_raw.clone());
    match kind {
        RollupKind::Outcome => (crew, Some(event.outcome_raw.clone())),
        RollupKind::Direction => (crew, event.direction.clone()),
        RollupKind::FrequencyBand => (crew, event.freq_band.clone()),
        RollupKind::Crew => (None, crew),
    }
}

/// Group events into daily rollup rows for backends without native rollups
pub(crate) fn derive_rollups(
    events: &[Event],
    kind: RollupKind,
    since: Option<NaiveDate>,
) -> Vec<RollupRow> {
    let mut rows: Vec<RollupRow> = Vec::new();
    let mut index: HashMap<(Option<NaiveDate>, Option<String>, Option<String>), usize> =
        HashMap::new();

    for event in events {
        if let (Some(since), Some(date)) = (since, event.occurred_date)
            && date < since
        {
            continue;
        }
        let (category_raw, key) = rollup_key(event, kind);
        let group = (event.occurred_date, category_raw, key);
        match index.get(&group) {
            Some(&i) => rows[i].daily_count += 1,
            None => {
                index.insert(group.clone(), rows.len());
                let (date, category_raw, key) = group;
                rows.push(RollupRow {
                    date,
                    category_raw,
                    key,
                    daily_count: 1,
                });
            }
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ev(date: Option<NaiveDate>, hour: u32, crew: &str) -> Event {
        Event {
            occurred_date: date,
            occurred_time: NaiveTime::from_hms_opt(hour, 0, 0),
            category_raw: crew.to_string(),
            ..Default::default()
        }
    }

    // --- FlightRow ---

    #[test]
    fn flight_row_with_aliases() {
        let row: FlightRow = serde_json::from_str(
            r#"{"flight_date":"2025-01-10","time":"06:00:00","crew":"МОЛНІЯ","action":"Збито","to_t":"Північ","freq_range":"5.8"}"#,
        )
        .unwrap();
        let event = row.into_event();
        assert_eq!(event.occurred_date, Some(d(2025, 1, 10)));
        assert_eq!(event.occurred_time, NaiveTime::from_hms_opt(6, 0, 0));
        assert_eq!(event.direction.as_deref(), Some("Північ"));
        assert_eq!(event.freq_band.as_deref(), Some("5.8"));
    }

    #[test]
    fn flight_row_timestamp_date_and_blank_time() {
        let row: FlightRow =
            serde_json::from_str(r#"{"date":"2025-01-10T00:00:00+02:00","time":"","crew":"ФПВ"}"#)
                .unwrap();
        let event = row.into_event();
        assert_eq!(event.occurred_date, Some(d(2025, 1, 10)));
        assert_eq!(event.occurred_time, None);
    }

    #[test]
    fn flight_row_bad_date_is_none() {
        let row: FlightRow = serde_json::from_str(r#"{"date":"yesterday","crew":"ФПВ"}"#).unwrap();
        assert_eq!(row.into_event().occurred_date, None);
        let row: FlightRow = serde_json::from_str(r#"{"crew":"ФПВ"}"#).unwrap();
        assert_eq!(row.into_event().occurred_date, None);
    }

    #[derive(Deserialize)]
    struct CountOnly {
        #[serde(deserialize_with = "count_from_number_or_string")]
        daily_count: u64,
    }

    #[test]
    fn daily_count_number_or_string() {
        let parse = |s: &str| serde_json::from_str::<CountOnly>(s).unwrap().daily_count;
        assert_eq!(parse(r#"{"daily_count":7}"#), 7);
        assert_eq!(parse(r#"{"daily_count":"12"}"#), 12);
        assert_eq!(parse(r#"{"daily_count":3.0}"#), 3);
        assert_eq!(parse(r#"{"daily_count":null}"#), 0);
    }

    // --- apply_query ---

    #[test]
    fn apply_query_filters_and_orders() {
        let events = vec![
            ev(Some(d(2025, 1, 9)), 8, "b"),
            ev(None, 0, "x"),
            ev(Some(d(2025, 1, 8)), 8, "old"),
            ev(Some(d(2025, 1, 9)), 6, "a"),
            ev(Some(d(2025, 1, 10)), 1, "c"),
        ];
        let query = EventQuery {
            since: Some(d(2025, 1, 9)),
            order: SortOrder::Ascending,
        };
        let asc: Vec<String> = apply_query(events.clone(), query)
            .into_iter()
            .map(|e| e.category_raw)
            .collect();
        assert_eq!(asc, ["a", "b", "c", "x"]);

        let query = EventQuery {
            order: SortOrder::Descending,
            ..query
        };
        let desc: Vec<String> = apply_query(events, query)
            .into_iter()
            .map(|e| e.category_raw)
            .collect();
        assert_eq!(desc, ["c", "b", "a", "x"]);
    }

    // --- derive_rollups ---

    #[test]
    fn derive_rollups_groups_by_day_and_key() {
        let mut a = ev(Some(d(2025, 1, 9)), 6, "МОЛНІЯ");
        a.direction = Some("Північ".to_string());
        let mut b = a.clone();
        b.occurred_time = NaiveTime::from_hms_opt(9, 0, 0);
        let mut c = ev(Some(d(2025, 1, 10)), 6, "МОЛНІЯ");
        c.direction = Some("Північ".to_string());

        let rows = derive_rollups(&[a, b, c], RollupKind::Direction, None);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].daily_count, 2);
        assert_eq!(rows[0].key.as_deref(), Some("Північ"));
        assert_eq!(rows[1].date, Some(d(2025, 1, 10)));
    }

    #[test]
    fn derive_crew_rollups_have_no_category() {
        let rows = derive_rollups(
            &[ev(Some(d(2025, 1, 9)), 6, "Оптика-1")],
            RollupKind::Crew,
            Some(d(2025, 1, 1)),
        );
        assert_eq!(rows[0].category_raw, None);
        assert_eq!(rows[0].key.as_deref(), Some("Оптика-1"));
    }
}

//! PostgREST (Supabase) endpoint
//!
//! Raw flights come from the `flights` table, rollups from the daily stats
//! views. Requests are blocking `ureq` calls moved off the async runtime.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use super::poll::{ChangePoller, hash_bytes};
use super::{
    ChangeFeed, EventQuery, EventSource, FlightRow, RollupSource, SortOrder, apply_query,
    count_from_number_or_string, parse_row_date,
};
use crate::consts::DATE_FORMAT;
use crate::core::{Event, RollupKind, RollupRow};
use crate::error::FetchError;

/// Rows requested per page; the server may return fewer (`max-rows`)
const PAGE_SIZE: usize = 1000;

const REST_PREFIX: &str = "/rest/v1";

/// Table and key column of each rollup view
fn rollup_table(kind: RollupKind) -> (&'static str, &'static str) {
    match kind {
        RollupKind::Outcome => ("outcome_daily_stats", "action"),
        RollupKind::Direction => ("direction_daily_stats", "direction"),
        RollupKind::FrequencyBand => ("video_frequency_stats", "freq_range"),
        RollupKind::Crew => ("crew_daily_stats", "crew_name"),
    }
}

#[derive(Debug, Deserialize)]
struct RollupRecord {
    #[serde(default, alias = "date")]
    flight_date: Option<String>,
    #[serde(default)]
    drone_category: Option<String>,
    #[serde(default, deserialize_with = "count_from_number_or_string")]
    daily_count: u64,
    #[serde(flatten)]
    columns: HashMap<String, serde_json::Value>,
}

impl RollupRecord {
    fn into_row(self, key_column: &str) -> RollupRow {
        RollupRow {
            date: self.flight_date.as_deref().and_then(parse_row_date),
            category_raw: self.drone_category,
            key: self
                .columns
                .get(key_column)
                .and_then(serde_json::Value::as_str)
                .map(str::to_string),
            daily_count: self.daily_count,
        }
    }
}

/// Connection settings, cheap to clone into blocking tasks
#[derive(Debug, Clone)]
struct Endpoint {
    base: String,
    api_key: Option<String>,
}

impl Endpoint {
    fn new(url: &str, api_key: Option<String>) -> Self {
        let trimmed = url.trim().trim_end_matches('/');
        let base = if trimmed.ends_with(REST_PREFIX) {
            trimmed.to_string()
        } else {
            format!("{trimmed}{REST_PREFIX}")
        };
        Endpoint { base, api_key }
    }

    fn url(&self, table: &str, query: &[(String, String)]) -> String {
        let params: Vec<String> = query.iter().map(|(k, v)| format!("{k}={v}")).collect();
        format!("{}/{}?{}", self.base, table, params.join("&"))
    }

    fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut request = ureq::get(url).header("Accept", "application/json");
        if let Some(key) = &self.api_key {
            request = request
                .header("apikey", key)
                .header("Authorization", &format!("Bearer {key}"));
        }
        let response = request
            .call()
            .map_err(|e| FetchError::Http(format!("{url}: {e}")))?;
        let mut body = response.into_body();
        body.read_to_vec()
            .map_err(|e| FetchError::Http(format!("{url}: {e}")))
    }

    /// All rows of a table, following `limit`/`offset` pages.
    ///
    /// `query` must carry a total `order`, or pages may overlap.
    fn get_all<T: DeserializeOwned>(
        &self,
        table: &str,
        query: Vec<(String, String)>,
    ) -> Result<Vec<T>, FetchError> {
        let rows = collect_pages(|offset| {
            let url = self.url(table, &page_params(&query, offset));
            let bytes = self.get_bytes(&url)?;
            serde_json::from_slice(&bytes).map_err(|e| FetchError::Decode {
                what: table.to_string(),
                message: e.to_string(),
            })
        })?;
        tracing::debug!(table, rows = rows.len(), "fetched from REST endpoint");
        Ok(rows)
    }
}

fn page_params(query: &[(String, String)], offset: usize) -> Vec<(String, String)> {
    let mut params = query.to_vec();
    params.push(("limit".to_string(), PAGE_SIZE.to_string()));
    params.push(("offset".to_string(), offset.to_string()));
    params
}

/// Request pages until one comes back empty; a short page is not the end
fn collect_pages<T, F>(mut fetch_page: F) -> Result<Vec<T>, FetchError>
where
    F: FnMut(usize) -> Result<Vec<T>, FetchError>,
{
    let mut rows = Vec::new();
    loop {
        let page = fetch_page(rows.len())?;
        if page.is_empty() {
            return Ok(rows);
        }
        rows.extend(page);
    }
}

fn since_filter(column: &str, since: Option<NaiveDate>) -> Option<(String, String)> {
    since.map(|d| (column.to_string(), format!("gte.{}", d.format(DATE_FORMAT))))
}

fn flights_query(query: EventQuery) -> Vec<(String, String)> {
    let direction = match query.order {
        SortOrder::Ascending => "asc",
        SortOrder::Descending => "desc",
    };
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        (
            "order".to_string(),
            format!("date.{direction}.nullslast,time.{direction}.nullsfirst"),
        ),
    ];
    params.extend(since_filter("date", query.since));
    params
}

fn rollup_query(kind: RollupKind, since: Option<NaiveDate>) -> Vec<(String, String)> {
    let (_, key_column) = rollup_table(kind);
    // the crew view carries no category column
    let order = match kind {
        RollupKind::Crew => format!("flight_date.asc,{key_column}.asc"),
        _ => format!("flight_date.asc,drone_category.asc,{key_column}.asc"),
    };
    let mut params = vec![
        ("select".to_string(), "*".to_string()),
        ("order".to_string(), order),
    ];
    params.extend(since_filter("flight_date", since));
    params
}

pub(crate) struct RestSource {
    endpoint: Endpoint,
    poller: ChangePoller,
}

impl RestSource {
    pub(crate) fn new(url: &str, api_key: Option<String>, poll_interval: Duration) -> Self {
        let endpoint = Endpoint::new(url, api_key);
        let watched = Arc::new(endpoint.clone());
        RestSource {
            poller: ChangePoller::new("rest", poll_interval, move || latest_rows_fingerprint(&watched)),
            endpoint,
        }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T, FetchError>
    where
        T: Send + 'static,
        F: FnOnce(Endpoint) -> Result<T, FetchError> + Send + 'static,
    {
        let endpoint = self.endpoint.clone();
        tokio::task::spawn_blocking(move || f(endpoint))
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?
    }
}

/// Hash of the newest flights; edits and inserts both move it
fn latest_rows_fingerprint(endpoint: &Endpoint) -> Option<u64> {
    let url = endpoint.url(
        "flights",
        &[
            ("select".to_string(), "*".to_string()),
            ("order".to_string(), "date.desc,time.desc".to_string()),
            ("limit".to_string(), "20".to_string()),
        ],
    );
    match endpoint.get_bytes(&url) {
        Ok(bytes) => Some(hash_bytes(&bytes)),
        Err(e) => {
            tracing::debug!(error = %e, "change check failed");
            None
        }
    }
}

#[async_trait]
impl EventSource for RestSource {
    fn display_name(&self) -> &str {
        "rest"
    }

    async fn fetch_events(&self, query: EventQuery) -> Result<Vec<Event>, FetchError> {
        let rows: Vec<FlightRow> = self
            .blocking(move |endpoint| endpoint.get_all("flights", flights_query(query)))
            .await?;
        let events = rows.into_iter().map(FlightRow::into_event).collect();
        // the server sorts too, but dateless rows must land last either way
        Ok(apply_query(events, query))
    }
}

#[async_trait]
impl RollupSource for RestSource {
    async fn fetch_rollups(
        &self,
        kind: RollupKind,
        since: Option<NaiveDate>,
    ) -> Result<Vec<RollupRow>, FetchError> {
        let (table, key_column) = rollup_table(kind);
        let query = rollup_query(kind, since);
        let records: Vec<RollupRecord> = self
            .blocking(move |endpoint| endpoint.get_all(table, query))
            .await?;
        Ok(records
            .into_iter()
            .map(|r| r.into_row(key_column))
            .collect())
    }
}

impl ChangeFeed for RestSource {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.poller.subscribe()
    }
}

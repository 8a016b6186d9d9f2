//! Local SQLite database with a `flights` table
//!
//! Rollups are computed by the database with `GROUP BY`, preserving the
//! order in which keys first appear.

use async_trait::async_trait;
use chrono::NaiveDate;
use rusqlite::{Connection, OpenFlags, params};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::broadcast;

use super::poll::{ChangePoller, file_meta, hash_bytes};
use super::{
    ChangeFeed, EventQuery, EventSource, FlightRow, RollupSource, apply_query, parse_row_date,
};
use crate::consts::DATE_FORMAT;
use crate::core::{Event, RollupKind, RollupRow};
use crate::error::FetchError;

pub(crate) struct SqliteSource {
    path: PathBuf,
    poller: ChangePoller,
}

impl SqliteSource {
    pub(crate) fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        let path = path.into();
        let watched = path.clone();
        SqliteSource {
            poller: ChangePoller::new("sqlite", poll_interval, move || {
                Some(hash_bytes(format!("{:?}", file_meta(&watched)).as_bytes()))
            }),
            path,
        }
    }

    async fn with_connection<T, F>(&self, f: F) -> Result<T, FetchError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, FetchError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let conn = open(&path)?;
            f(&conn)
        })
        .await
        .map_err(|e| FetchError::Unavailable(e.to_string()))?
    }
}

fn open(path: &Path) -> Result<Connection, FetchError> {
    if !path.exists() {
        return Err(FetchError::Unavailable(format!(
            "database {} not found",
            path.display()
        )));
    }
    Ok(Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?)
}

fn since_param(since: Option<NaiveDate>) -> Option<String> {
    since.map(|d| d.format(DATE_FORMAT).to_string())
}

fn query_events(conn: &Connection, since: Option<NaiveDate>) -> Result<Vec<Event>, FetchError> {
    let mut stmt = conn.prepare(
        "SELECT date, time, crew, action, direction, freq_band, video
         FROM flights
         WHERE ?1 IS NULL OR date IS NULL OR date >= ?1",
    )?;
    let rows = stmt.query_map(params![since_param(since)], |row| {
        Ok(FlightRow {
            date: row.get(0)?,
            time: row.get(1)?,
            crew: row.get(2)?,
            action: row.get(3)?,
            direction: row.get(4)?,
            freq_band: row.get(5)?,
            video: row.get(6)?,
        })
    })?;

    let mut events = Vec::new();
    for row in rows {
        events.push(row?.into_event());
    }
    Ok(events)
}

/// (category column, key column) for a rollup kind
fn rollup_columns(kind: RollupKind) -> (&'static str, &'static str) {
    match kind {
        RollupKind::Outcome => ("crew", "action"),
        RollupKind::Direction => ("crew", "direction"),
        RollupKind::FrequencyBand => ("crew", "freq_band"),
        RollupKind::Crew => ("NULL", "crew"),
    }
}

fn query_rollups(
    conn: &Connection,
    kind: RollupKind,
    since: Option<NaiveDate>,
) -> Result<Vec<RollupRow>, FetchError> {
    let (category, key) = rollup_columns(kind);
    let group = match kind {
        RollupKind::Crew => key.to_string(),
        _ => format!("{category}, {key}"),
    };
    let sql = format!(
        "SELECT date, {category}, {key}, COUNT(*)
         FROM flights
         WHERE ?1 IS NULL OR date IS NULL OR date >= ?1
         GROUP BY date, {group}
         ORDER BY MIN(rowid)"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![since_param(since)], |row| {
        let date: Option<String> = row.get(0)?;
        let count: i64 = row.get(3)?;
        Ok(RollupRow {
            date: date.as_deref().and_then(parse_row_date),
            category_raw: row.get(1)?,
            key: row.get(2)?,
            daily_count: count.max(0) as u64,
        })
    })?;

    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

#[async_trait]
impl EventSource for SqliteSource {
    fn display_name(&self) -> &str {
        "sqlite"
    }

    async fn fetch_events(&self, query: EventQuery) -> Result<Vec<Event>, FetchError> {
        let events = self
            .with_connection(move |conn| query_events(conn, query.since))
            .await?;
        tracing::debug!(events = events.len(), "fetched flights from sqlite");
        Ok(apply_query(events, query))
    }
}

#[async_trait]
impl RollupSource for SqliteSource {
    async fn fetch_rollups(
        &self,
        kind: RollupKind,
        since: Option<NaiveDate>,
    ) -> Result<Vec<RollupRow>, FetchError> {
        self.with_connection(move |conn| query_rollups(conn, kind, since))
            .await
    }
}

impl ChangeFeed for SqliteSource {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.poller.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(path: &Path) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch(
            "CREATE TABLE flights (
                date TEXT, time TEXT, crew TEXT, action TEXT,
                direction TEXT, freq_band TEXT, video TEXT
            );
            INSERT INTO flights VALUES ('2025-01-10', '06:00', 'МОЛНІЯ', 'Збито БпЛА', 'Північ', '5.8', NULL);
            INSERT INTO flights VALUES ('2025-01-10', '07:00', 'МОЛНІЯ', 'РЕБ', 'Північ', NULL, NULL);
            INSERT INTO flights VALUES ('2025-01-09', '08:00', 'ФПВ', '', 'Схід', NULL, 'v1');
            INSERT INTO flights VALUES ('2024-12-01', NULL, 'ФПВ', '', 'Схід', NULL, NULL);
            INSERT INTO flights VALUES (NULL, '09:00', 'ФПВ', '', NULL, NULL, NULL);",
        )
        .unwrap();
    }

    fn source() -> (tempfile::TempDir, SqliteSource) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flights.db");
        seed(&path);
        let source = SqliteSource::new(path, Duration::from_secs(1));
        (dir, source)
    }

    #[tokio::test]
    async fn fetch_events_since_keeps_dateless_rows() {
        let (_dir, source) = source();
        let events = source
            .fetch_events(EventQuery {
                since: NaiveDate::from_ymd_opt(2025, 1, 1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 4);
        assert_eq!(events[0].category_raw, "ФПВ");
        assert_eq!(events[0].video_id.as_deref(), Some("v1"));
        assert!(events[3].occurred_date.is_none());
    }

    #[tokio::test]
    async fn direction_rollups_grouped_in_sql() {
        let (_dir, source) = source();
        let rows = source
            .fetch_rollups(RollupKind::Direction, NaiveDate::from_ymd_opt(2025, 1, 1))
            .await
            .unwrap();
        let north = rows
            .iter()
            .find(|r| r.key.as_deref() == Some("Північ"))
            .unwrap();
        assert_eq!(north.daily_count, 2);
        assert_eq!(north.category_raw.as_deref(), Some("МОЛНІЯ"));
        assert_eq!(rows[0].key.as_deref(), Some("Північ"));
    }

    #[tokio::test]
    async fn crew_rollups_have_no_category() {
        let (_dir, source) = source();
        let rows = source.fetch_rollups(RollupKind::Crew, None).await.unwrap();
        assert!(rows.iter().all(|r| r.category_raw.is_none()));
        let total: u64 = rows.iter().map(|r| r.daily_count).sum();
        assert_eq!(total, 5);
    }

    #[tokio::test]
    async fn missing_database_is_a_fetch_error() {
        let source = SqliteSource::new("/nonexistent/flights.db", Duration::from_secs(1));
        let err = source.fetch_events(EventQuery::default()).await.unwrap_err();
        assert!(matches!(err, FetchError::Unavailable(_)));
    }
}

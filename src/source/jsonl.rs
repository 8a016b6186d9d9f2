//! JSONL export files
//!
//! One flight row per line. Files matched by a glob are parsed in parallel;
//! rollups are derived from the parsed events since exports carry no
//! pre-aggregated tables.

use async_trait::async_trait;
use chrono::NaiveDate;
use rayon::prelude::*;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use super::poll::{ChangePoller, glob_fingerprint};
use super::{
    ChangeFeed, EventQuery, EventSource, FlightRow, RollupSource, apply_query, derive_rollups,
};
use crate::core::{Event, RollupKind, RollupRow};
use crate::error::FetchError;

pub(crate) struct JsonlSource {
    pattern: String,
    poller: ChangePoller,
}

impl JsonlSource {
    pub(crate) fn new(pattern: impl Into<String>, poll_interval: Duration) -> Self {
        let pattern = pattern.into();
        let watched = pattern.clone();
        JsonlSource {
            poller: ChangePoller::new("jsonl", poll_interval, move || Some(glob_fingerprint(&watched))),
            pattern,
        }
    }

    async fn load(&self) -> Result<Vec<Event>, FetchError> {
        let pattern = self.pattern.clone();
        tokio::task::spawn_blocking(move || load_exports(&pattern))
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?
    }
}

fn find_files(pattern: &str) -> Result<Vec<PathBuf>, FetchError> {
    let paths = glob::glob(pattern).map_err(|e| FetchError::Decode {
        what: format!("glob pattern {pattern}"),
        message: e.to_string(),
    })?;
    Ok(paths.flatten().collect())
}

/// Parse every matched file; a file that cannot be read fails the fetch
fn load_exports(pattern: &str) -> Result<Vec<Event>, FetchError> {
    let start = Instant::now();
    let files = find_files(pattern)?;
    if files.is_empty() {
        return Err(FetchError::Unavailable(format!("no files match {pattern}")));
    }

    let parsed: Vec<(Vec<Event>, usize)> = files
        .par_iter()
        .map(|path| parse_file(path))
        .collect::<Result<_, _>>()?;

    let skipped: usize = parsed.iter().map(|(_, s)| s).sum();
    let events: Vec<Event> = parsed.into_iter().flat_map(|(e, _)| e).collect();
    tracing::debug!(
        files = files.len(),
        events = events.len(),
        skipped,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "parsed JSONL exports"
    );
    Ok(events)
}

/// Events of one file plus the number of undecodable lines
fn parse_file(path: &Path) -> Result<(Vec<Event>, usize), FetchError> {
    let reader = BufReader::new(File::open(path)?);
    let mut events = Vec::new();
    let mut skipped = 0;

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<FlightRow>(trimmed) {
            Ok(row) => events.push(row.into_event()),
            Err(err) => {
                skipped += 1;
                tracing::debug!(
                    file = %path.display(),
                    line = line_no + 1,
                    error = %err,
                    "skipping undecodable line"
                );
            }
        }
    }
    Ok((events, skipped))
}

#[async_trait]
impl EventSource for JsonlSource {
    fn display_name(&self) -> &str {
        "jsonl"
    }

    async fn fetch_events(&self, query: EventQuery) -> Result<Vec<Event>, FetchError> {
        let events = self.load().await?;
        Ok(apply_query(events, query))
    }
}

#[async_trait]
impl RollupSource for JsonlSource {
    async fn fetch_rollups(
        &self,
        kind: RollupKind,
        since: Option<NaiveDate>,
    ) -> Result<Vec<RollupRow>, FetchError> {
        let events = self.load().await?;
        Ok(derive_rollups(&events, kind, since))
    }
}

impl ChangeFeed for JsonlSource {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.poller.subscribe()
    }
}

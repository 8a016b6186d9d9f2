//! In-process store, used for embedding and tests
//!
//! Every insert signals the change feed. Explicit rollup rows win over rollups
//! derived from the stored events.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use super::{ChangeFeed, EventQuery, EventSource, RollupSource, apply_query, derive_rollups};
use crate::core::{Event, RollupKind, RollupRow};
use crate::error::FetchError;

#[derive(Default)]
struct Store {
    events: Vec<Event>,
    rollups: HashMap<RollupKind, Vec<RollupRow>>,
}

pub(crate) struct MemorySource {
    store: Mutex<Store>,
    tx: broadcast::Sender<()>,
    failing: AtomicBool,
    fetches: AtomicUsize,
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySource {
    pub(crate) fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        MemorySource {
            store: Mutex::new(Store::default()),
            tx,
            failing: AtomicBool::new(false),
            fetches: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_events(events: Vec<Event>) -> Self {
        let source = Self::new();
        source.lock().events = events;
        source
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn insert(&self, event: Event) {
        self.lock().events.push(event);
        let _ = self.tx.send(());
    }

    pub(crate) fn insert_rollups(&self, kind: RollupKind, rows: Vec<RollupRow>) {
        self.lock().rollups.entry(kind).or_default().extend(rows);
        let _ = self.tx.send(());
    }

    /// Make every following fetch fail until switched off again
    pub(crate) fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Number of fetch calls served so far
    pub(crate) fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(FetchError::Unavailable("memory source set to fail".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl EventSource for MemorySource {
    fn display_name(&self) -> &str {
        "memory"
    }

    async fn fetch_events(&self, query: EventQuery) -> Result<Vec<Event>, FetchError> {
        self.check()?;
        let events = self.lock().events.clone();
        Ok(apply_query(events, query))
    }
}

#[async_trait]
impl RollupSource for MemorySource {
    async fn fetch_rollups(
        &self,
        kind: RollupKind,
        since: Option<NaiveDate>,
    ) -> Result<Vec<RollupRow>, FetchError> {
        self.check()?;
        let store = self.lock();
        match store.rollups.get(&kind) {
            Some(rows) => Ok(rows
                .iter()
                .filter(|r| match (since, r.date) {
                    (Some(since), Some(date)) => date >= since,
                    _ => true,
                })
                .cloned()
                .collect()),
            None => Ok(derive_rollups(&store.events, kind, since)),
        }
    }
}

impl ChangeFeed for MemorySource {
    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(date: &str, crew: &str) -> Event {
        Event {
            occurred_date: crate::utils::parse_date(date).ok(),
            category_raw: crew.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn insert_notifies_subscribers() {
        let source = MemorySource::new();
        let mut rx = source.subscribe();
        source.insert(event("2025-01-10", "ФПВ"));
        assert!(rx.recv().await.is_ok());
        let events = source.fetch_events(EventQuery::default()).await.unwrap();
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn failing_source_reports_error() {
        let source = MemorySource::with_events(vec![event("2025-01-10", "ФПВ")]);
        source.set_failing(true);
        assert!(source.fetch_events(EventQuery::default()).await.is_err());
        assert!(source.fetch_rollups(RollupKind::Crew, None).await.is_err());
        source.set_failing(false);
        assert!(source.fetch_events(EventQuery::default()).await.is_ok());
        assert_eq!(source.fetch_count(), 3);
    }

    #[tokio::test]
    async fn explicit_rollups_override_derived() {
        let source = MemorySource::with_events(vec![event("2025-01-10", "ФПВ")]);
        let derived = source.fetch_rollups(RollupKind::Crew, None).await.unwrap();
        assert_eq!(derived.len(), 1);

        source.insert_rollups(
            RollupKind::Crew,
            vec![
                RollupRow {
                    date: NaiveDate::from_ymd_opt(2025, 1, 1),
                    key: Some("old".to_string()),
                    daily_count: 9,
                    ..Default::default()
                },
                RollupRow {
                    date: NaiveDate::from_ymd_opt(2025, 1, 10),
                    key: Some("Молнія-2".to_string()),
                    daily_count: 5,
                    ..Default::default()
                },
            ],
        );
        let rows = source
            .fetch_rollups(RollupKind::Crew, NaiveDate::from_ymd_opt(2025, 1, 5))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].daily_count, 5);
    }
}

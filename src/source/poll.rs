//! Change detection by polling
//!
//! Backends without a push channel compare a cheap fingerprint of their data
//! on an interval and emit a tick when it moves.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, UNIX_EPOCH};
use tokio::sync::broadcast;

/// Capacity of the tick channel; lagging receivers only need "something changed"
const CHANNEL_CAPACITY: usize = 16;

/// `None` means the check failed this round and is retried on the next tick
type Fingerprint = Arc<dyn Fn() -> Option<u64> + Send + Sync>;

/// Modification time (seconds) and size of a file
pub(crate) fn file_meta(path: &Path) -> Option<(i64, u64)> {
    let meta = std::fs::metadata(path).ok()?;
    let mtime = meta
        .modified()
        .ok()?
        .duration_since(UNIX_EPOCH)
        .ok()?
        .as_secs() as i64;
    Some((mtime, meta.len()))
}

/// Fingerprint of every file matched by a glob pattern
pub(crate) fn glob_fingerprint(pattern: &str) -> u64 {
    let mut metas: Vec<(String, Option<(i64, u64)>)> = match glob::glob(pattern) {
        Ok(paths) => paths
            .flatten()
            .map(|p| (p.display().to_string(), file_meta(&p)))
            .collect(),
        Err(_) => Vec::new(),
    };
    metas.sort();
    let mut hasher = DefaultHasher::new();
    metas.hash(&mut hasher);
    hasher.finish()
}

pub(crate) fn hash_bytes(bytes: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    hasher.finish()
}

/// Broadcasts a tick whenever the fingerprint changes.
///
/// The polling task starts on the first `subscribe` and needs a tokio runtime.
pub(crate) struct ChangePoller {
    name: String,
    interval: Duration,
    fingerprint: Fingerprint,
    tx: broadcast::Sender<()>,
    started: OnceLock<()>,
}

impl ChangePoller {
    pub(crate) fn new<F>(name: impl Into<String>, interval: Duration, fingerprint: F) -> Self
    where
        F: Fn() -> Option<u64> + Send + Sync + 'static,
    {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        ChangePoller {
            name: name.into(),
            interval,
            fingerprint: Arc::new(fingerprint),
            tx,
            started: OnceLock::new(),
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<()> {
        let rx = self.tx.subscribe();
        self.start();
        rx
    }

    fn start(&self) {
        if self.started.set(()).is_err() {
            return;
        }
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(source = %self.name, "no async runtime; change polling disabled");
            return;
        };
        tracing::debug!(source = %self.name, interval_ms = self.interval.as_millis() as u64, "polling for changes");
        handle.spawn(poll_loop(
            self.name.clone(),
            self.interval,
            Arc::clone(&self.fingerprint),
            self.tx.clone(),
        ));
    }
}

async fn poll_loop(
    name: String,
    interval: Duration,
    fingerprint: Fingerprint,
    tx: broadcast::Sender<()>,
) {
    let compute = |f: Fingerprint| async move {
        tokio::task::spawn_blocking(move || f()).await.ok().flatten()
    };

    let mut last = compute(Arc::clone(&fingerprint)).await;
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // first tick fires immediately
    ticker.tick().await;

    loop {
        ticker.tick().await;
        let Some(current) = compute(Arc::clone(&fingerprint)).await else {
            continue;
        };
        match last {
            Some(previous) if previous == current => {}
            Some(_) => {
                last = Some(current);
                tracing::debug!(source = %name, "data changed");
                // no subscribers is fine; a later subscriber only needs future ticks
                let _ = tx.send(());
            }
            None => last = Some(current),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[test]
    fn glob_fingerprint_tracks_file_changes() {
        let dir = tempfile::tempdir().unwrap();
        let pattern = format!("{}/*.jsonl", dir.path().display());
        let empty = glob_fingerprint(&pattern);

        std::fs::write(dir.path().join("a.jsonl"), "{}\n").unwrap();
        let one = glob_fingerprint(&pattern);
        assert_ne!(empty, one);
        assert_eq!(one, glob_fingerprint(&pattern));

        std::fs::write(dir.path().join("a.jsonl"), "{}\n{}\n").unwrap();
        assert_ne!(one, glob_fingerprint(&pattern));
    }

    #[test]
    fn file_meta_missing_file() {
        assert!(file_meta(Path::new("/nonexistent/shiftstats.db")).is_none());
    }

    #[tokio::test]
    async fn poller_ticks_on_change() {
        let state = Arc::new(AtomicU64::new(1));
        let counter = Arc::clone(&state);
        let poller = ChangePoller::new("test", Duration::from_millis(20), move || {
            Some(counter.load(Ordering::SeqCst))
        });
        let mut rx = poller.subscribe();

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(rx.try_recv().is_err());

        state.store(2, Ordering::SeqCst);
        let tick = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert!(matches!(tick, Ok(Ok(()))));
    }
}

//! Data source registry
//!
//! Builds the configured backend behind the `DataSource` trait object.

use std::sync::Arc;
use std::time::Duration;

use super::DataSource;
use super::jsonl::JsonlSource;
use super::rest::RestSource;
use super::sqlite::SqliteSource;
use crate::config::{SourceConfig, SourceKind};
use crate::error::AppError;

/// Default JSONL location when nothing is configured
const DEFAULT_JSONL_PATTERN: &str = "*.jsonl";
const DEFAULT_POLL_SECONDS: u64 = 5;

/// Shared handle, cloned into every report build
pub(crate) type SharedSource = Arc<dyn DataSource>;

pub(crate) fn open_source(config: &SourceConfig) -> Result<SharedSource, AppError> {
    let poll = Duration::from_secs(config.poll_seconds.unwrap_or(DEFAULT_POLL_SECONDS).max(1));
    let kind = config.kind.unwrap_or_default();

    let source: SharedSource = match kind {
        SourceKind::Jsonl => {
            let pattern = config.path.as_deref().unwrap_or(DEFAULT_JSONL_PATTERN);
            Arc::new(JsonlSource::new(pattern, poll))
        }
        SourceKind::Sqlite => {
            let path = config
                .path
                .as_deref()
                .ok_or_else(|| AppError::Config("sqlite source needs `path`".to_string()))?;
            Arc::new(SqliteSource::new(path, poll))
        }
        SourceKind::Rest => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| AppError::Config("rest source needs `url`".to_string()))?;
            let api_key = config
                .api_key
                .clone()
                .or_else(|| std::env::var("SHIFTSTATS_API_KEY").ok());
            Arc::new(RestSource::new(url, api_key, poll))
        }
    };
    tracing::debug!(source = source.display_name(), "opened data source");
    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_jsonl() {
        let source = open_source(&SourceConfig::default()).unwrap();
        assert_eq!(source.display_name(), "jsonl");
    }

    #[test]
    fn sqlite_requires_path() {
        let config = SourceConfig {
            kind: Some(SourceKind::Sqlite),
            ..Default::default()
        };
        assert!(matches!(open_source(&config), Err(AppError::Config(_))));
    }

    #[test]
    fn rest_requires_url() {
        let config = SourceConfig {
            kind: Some(SourceKind::Rest),
            ..Default::default()
        };
        assert!(open_source(&config).is_err());

        let config = SourceConfig {
            kind: Some(SourceKind::Rest),
            url: Some("http://localhost:3000".to_string()),
            ..Default::default()
        };
        assert_eq!(open_source(&config).unwrap().display_name(), "rest");
    }
}

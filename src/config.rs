use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::DayPolicy;
use crate::error::AppError;

/// Which counters feed the report: raw events or outcome rollups
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum CounterBasis {
    #[default]
    Events,
    Rollups,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum SourceKind {
    #[default]
    Jsonl,
    Sqlite,
    Rest,
}

impl SourceKind {
    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "jsonl" => Some(SourceKind::Jsonl),
            "sqlite" => Some(SourceKind::Sqlite),
            "rest" | "supabase" => Some(SourceKind::Rest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub(crate) struct SourceConfig {
    #[serde(default)]
    pub(crate) kind: Option<SourceKind>,
    /// JSONL glob or SQLite file
    #[serde(default)]
    pub(crate) path: Option<String>,
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default)]
    pub(crate) api_key: Option<String>,
    #[serde(default)]
    pub(crate) poll_seconds: Option<u64>,
}

impl SourceConfig {
    /// Apply a `--source` value: `KIND`, `KIND:LOCATION` or a bare location.
    ///
    /// A bare location ending in `.db`/`.sqlite` selects SQLite, an
    /// `http(s)://` location selects REST, anything else is a JSONL glob.
    pub(crate) fn override_with(&mut self, value: &str) -> Result<(), AppError> {
        let value = value.trim();
        if value.is_empty() {
            return Err(AppError::Config("empty --source".to_string()));
        }
        if let Some(kind) = SourceKind::parse(value) {
            self.kind = Some(kind);
            return Ok(());
        }
        if let Some((prefix, location)) = value.split_once(':')
            && let Some(kind) = SourceKind::parse(prefix)
        {
            self.set_location(kind, location);
            return Ok(());
        }
        let kind = if value.starts_with("http://") || value.starts_with("https://") {
            SourceKind::Rest
        } else if value.ends_with(".db") || value.ends_with(".sqlite") {
            SourceKind::Sqlite
        } else {
            SourceKind::Jsonl
        };
        self.set_location(kind, value);
        Ok(())
    }

    fn set_location(&mut self, kind: SourceKind, location: &str) {
        self.kind = Some(kind);
        match kind {
            SourceKind::Rest => self.url = Some(location.to_string()),
            SourceKind::Jsonl | SourceKind::Sqlite => self.path = Some(location.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Config {
    #[serde(default)]
    pub(crate) timezone: Option<String>,
    /// "HH:MM"
    #[serde(default)]
    pub(crate) shift_boundary: Option<String>,
    #[serde(default)]
    pub(crate) day_policy: Option<DayPolicy>,
    /// "YYYY-MM-DD"
    #[serde(default)]
    pub(crate) epoch: Option<String>,
    #[serde(default)]
    pub(crate) counter_basis: Option<CounterBasis>,
    #[serde(default)]
    pub(crate) top_directions: Option<usize>,
    #[serde(default)]
    pub(crate) top_frequency_bands: Option<usize>,
    #[serde(default)]
    pub(crate) top_crews: Option<usize>,
    #[serde(default)]
    pub(crate) categories: Option<Vec<String>>,
    #[serde(default)]
    pub(crate) no_color: bool,
    #[serde(default)]
    pub(crate) source: SourceConfig,
}

impl Config {
    /// Load from an explicit path (errors are fatal) or the first readable default location
    pub(crate) fn load(explicit: Option<&Path>) -> Result<Self, AppError> {
        if let Some(path) = explicit {
            let content = fs::read_to_string(path)
                .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
            let config = Self::parse(&content)
                .map_err(|e| AppError::Config(format!("{}: {e}", path.display())))?;
            tracing::debug!(path = %path.display(), "loaded config");
            return Ok(config);
        }

        // Try config locations in order of priority
        for path in Self::get_config_paths() {
            if path.exists()
                && let Ok(content) = fs::read_to_string(&path)
            {
                match Self::parse(&content) {
                    Ok(config) => {
                        tracing::debug!(path = %path.display(), "loaded config");
                        return Ok(config);
                    }
                    Err(e) => {
                        tracing::warn!(path = %path.display(), error = %e, "failed to parse config");
                    }
                }
            }
        }

        Ok(Self::default())
    }

    fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str::<Config>(content)
    }

    fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // 1. XDG config: ~/.config/shiftstats/config.toml
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".config").join("shiftstats").join("config.toml"));
        }

        // 2. Platform config dir (macOS Application Support)
        if let Some(config_dir) = dirs::config_dir() {
            let platform_path = config_dir.join("shiftstats").join("config.toml");
            if !paths.contains(&platform_path) {
                paths.push(platform_path);
            }
        }

        // 3. Home directory: ~/.shiftstats.toml
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".shiftstats.toml"));
        }

        paths
    }
}

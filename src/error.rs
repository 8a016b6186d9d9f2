use thiserror::Error;

#[derive(Debug, Error)]
pub(crate) enum AppError {
    #[error("Invalid date \"{input}\" (expected YYYYMMDD or YYYY-MM-DD)")]
    InvalidDate { input: String },

    #[error("Invalid time \"{input}\" (expected HH:MM or HH:MM:SS)")]
    InvalidTime { input: String },

    #[error("Invalid instant \"{input}\" (expected YYYY-MM-DDTHH:MM[:SS])")]
    InvalidInstant { input: String },

    #[error("Invalid timezone: {input}")]
    InvalidTimezone { input: String },

    #[error("Unknown category \"{input}\" (expected MOLNIYA, FPV or OPTIC)")]
    InvalidCategory { input: String },

    #[error("Invalid config: {0}")]
    Config(String),

    #[error("{0}")]
    Report(#[from] ReportError),

    #[error("Failed to encode JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures raised while building a report
#[derive(Debug, Error)]
pub(crate) enum ReportError {
    #[error("Unknown report window \"{input}\" (expected day, week, month, all, currentShift or previousShift)")]
    InvalidWindowName { input: String },

    #[error("Report window \"{name}\" is empty (start is not before end)")]
    EmptyWindow { name: String },

    #[error("Failed to fetch data: {0}")]
    DataFetch(#[from] FetchError),
}

/// Failures of an external data collaborator
#[derive(Debug, Error)]
pub(crate) enum FetchError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("Data source unavailable: {0}")]
    Unavailable(String),
}

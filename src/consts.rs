/// Standard date format used throughout the codebase: "2025-01-15"
pub(crate) const DATE_FORMAT: &str = "%Y-%m-%d";

/// Display format for instants rendered in the target timezone
pub(crate) const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M";

/// Label of the synthetic bucket that folds everything past the top K
pub(crate) const OTHER_LABEL: &str = "OTHER";

/// Target timezone when neither CLI nor config names one
pub(crate) const DEFAULT_TIMEZONE: &str = "Europe/Kyiv";

/// Canonical shift change (hour, minute)
pub(crate) const DEFAULT_SHIFT_BOUNDARY: (u32, u32) = (4, 40);

/// First day of recorded data; start of the "all" window
pub(crate) const DEFAULT_EPOCH: (i32, u32, u32) = (2025, 12, 5);

pub(crate) const DEFAULT_TOP_DIRECTIONS: usize = 5;
pub(crate) const DEFAULT_TOP_FREQUENCY_BANDS: usize = 5;
pub(crate) const DEFAULT_TOP_CREWS: usize = 10;

//! CLI subcommand definitions

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Counters, efficiency and rankings for --window (default)
    Report,
    /// Current vs previous shift counters
    Shift,
    /// Detections per day across --window, zero-filled
    Daily,
    /// Rankings only
    Top {
        /// Override every ranking size
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Rebuild the report whenever the source changes
    Watch,
}

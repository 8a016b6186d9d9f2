//! CLI argument definitions
//!
//! Global CLI options and configuration merging logic.

use std::io::IsTerminal;
use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use crate::config::Config;

use super::commands::Commands;

#[derive(Debug, Clone, Copy, Default, ValueEnum, PartialEq)]
pub(crate) enum ColorMode {
    /// Auto-detect based on terminal (default)
    #[default]
    Auto,
    /// Always use colors
    Always,
    /// Never use colors
    Never,
}

#[derive(Parser)]
#[command(name = "shiftstats")]
#[command(about = "Shift-aligned flight detection statistics", version)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Option<Commands>,

    /// Reporting window: day, week, month, all, currentShift, previousShift
    #[arg(short, long, global = true, default_value = "day")]
    pub(crate) window: String,

    /// Evaluate as if the current time were this local instant (YYYY-MM-DDTHH:MM)
    #[arg(long, global = true, value_name = "INSTANT")]
    pub(crate) now: Option<String>,

    /// Target timezone (default "Europe/Kyiv")
    #[arg(long, global = true, value_name = "TZ")]
    pub(crate) timezone: Option<String>,

    /// Restrict to a category (MOLNIYA, FPV, OPTIC); repeatable
    #[arg(short = 'C', long = "category", global = true, value_delimiter = ',')]
    pub(crate) categories: Vec<String>,

    /// Output as JSON
    #[arg(short, long, global = true)]
    pub(crate) json: bool,

    /// Config file (default: ~/.config/shiftstats/config.toml)
    #[arg(long, global = true, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Data source: KIND, KIND:LOCATION or a bare location
    #[arg(short = 'S', long, global = true, value_name = "SOURCE")]
    pub(crate) source: Option<String>,

    /// Color output mode
    #[arg(long, global = true, value_enum, default_value = "auto")]
    pub(crate) color: ColorMode,

    /// Disable colored output (shorthand for --color=never)
    #[arg(long, global = true)]
    pub(crate) no_color: bool,

    /// Enable debug logging on stderr
    #[arg(long, global = true)]
    pub(crate) debug: bool,
}

impl Cli {
    /// Merge config file values into CLI (CLI args take precedence)
    pub(crate) fn with_config(mut self, config: &Config) -> Self {
        if !self.no_color && config.no_color {
            self.no_color = true;
        }
        if self.timezone.is_none() {
            self.timezone = config.timezone.clone();
        }
        if self.categories.is_empty()
            && let Some(categories) = &config.categories
        {
            self.categories = categories.clone();
        }
        self
    }

    pub(crate) fn use_color(&self) -> bool {
        if self.no_color {
            return false;
        }
        match self.color {
            ColorMode::Always => true,
            ColorMode::Never => false,
            ColorMode::Auto => std::io::stdout().is_terminal(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Commands;

    #[test]
    fn defaults() {
        let cli = Cli::parse_from(["shiftstats"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.window, "day");
        assert!(cli.categories.is_empty());
        assert!(!cli.json);
    }

    #[test]
    fn categories_are_repeatable_and_comma_separated() {
        let cli = Cli::parse_from(["shiftstats", "-C", "fpv", "--category", "OPTIC,MOLNIYA"]);
        assert_eq!(cli.categories, ["fpv", "OPTIC", "MOLNIYA"]);
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from(["shiftstats", "top", "--limit", "3", "--json", "-w", "week"]);
        assert!(matches!(cli.command, Some(Commands::Top { limit: Some(3) })));
        assert!(cli.json);
        assert_eq!(cli.window, "week");
    }

    #[test]
    fn config_fills_unset_values_only() {
        let config = Config {
            timezone: Some("UTC".to_string()),
            categories: Some(vec!["FPV".to_string()]),
            no_color: true,
            ..Default::default()
        };
        let cli = Cli::parse_from(["shiftstats", "--timezone", "Europe/Kyiv"]).with_config(&config);
        assert_eq!(cli.timezone.as_deref(), Some("Europe/Kyiv"));
        assert_eq!(cli.categories, ["FPV"]);
        assert!(!cli.use_color());
    }
}

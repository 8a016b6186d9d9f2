use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands};
use crate::config::{Config, SourceConfig};
use crate::core::{
    Category, CategorySet, Report, ReportFacade, ReportOptions, RequestSequencer, ShiftClock,
};
use crate::error::AppError;
use crate::output::{
    daily_json, print_daily_table, print_rankings_table, print_report_table, print_shift_table,
    rankings_json, report_json, shift_json,
};
use crate::source::{SharedSource, open_source};
use crate::utils::{Timezone, parse_date, parse_instant, parse_time};

/// Everything a command needs, resolved from CLI flags over config values
#[derive(Debug, Clone)]
pub(crate) struct Settings {
    pub(crate) clock: ShiftClock,
    pub(crate) categories: CategorySet,
    pub(crate) options: ReportOptions,
    pub(crate) source: SourceConfig,
    /// Fixed evaluation instant; `None` means the wall clock
    pub(crate) now: Option<DateTime<Utc>>,
}

impl Settings {
    pub(crate) fn resolve(cli: &Cli, config: &Config) -> Result<Self, AppError> {
        let defaults = ShiftClock::default();
        let timezone = Timezone::parse(cli.timezone.as_deref())?;
        let boundary = match config.shift_boundary.as_deref() {
            Some(s) => parse_time(s)?,
            None => defaults.boundary(),
        };
        let epoch = match config.epoch.as_deref() {
            Some(s) => parse_date(s)?,
            None => defaults.epoch(),
        };
        let day_policy = config.day_policy.unwrap_or(defaults.day_policy());
        let clock = ShiftClock::new(timezone, boundary, day_policy, epoch);

        let categories = if cli.categories.is_empty() {
            CategorySet::all()
        } else {
            cli.categories
                .iter()
                .map(|s| s.parse::<Category>())
                .collect::<Result<CategorySet, _>>()?
        };

        let base = ReportOptions::default();
        let mut options = ReportOptions {
            top_directions: config.top_directions.unwrap_or(base.top_directions),
            top_frequency_bands: config.top_frequency_bands.unwrap_or(base.top_frequency_bands),
            top_crews: config.top_crews.unwrap_or(base.top_crews),
            counter_basis: config.counter_basis.unwrap_or(base.counter_basis),
        };
        if let Some(Commands::Top { limit: Some(k) }) = cli.command {
            options.top_directions = k;
            options.top_frequency_bands = k;
            options.top_crews = k;
        }

        let mut source = config.source.clone();
        if let Some(value) = cli.source.as_deref() {
            source.override_with(value)?;
        }

        let now = cli
            .now
            .as_deref()
            .map(|s| parse_instant(s, timezone))
            .transpose()?;

        Ok(Settings {
            clock,
            categories,
            options,
            source,
            now,
        })
    }

    fn now(&self) -> DateTime<Utc> {
        self.now.unwrap_or_else(Utc::now)
    }
}

/// What part of the report a command prints
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Full,
    Shift,
    Daily,
    Rankings,
}

impl View {
    fn of(command: Option<&Commands>) -> Self {
        match command {
            Some(Commands::Shift) => View::Shift,
            Some(Commands::Daily) => View::Daily,
            Some(Commands::Top { .. }) => View::Rankings,
            Some(Commands::Report | Commands::Watch) | None => View::Full,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RenderOptions {
    view: View,
    json: bool,
    use_color: bool,
}

fn render(report: &Report, opts: RenderOptions) -> Result<(), AppError> {
    if opts.json {
        let json = match opts.view {
            View::Full => report_json(report)?,
            View::Shift => shift_json(report)?,
            View::Daily => daily_json(report)?,
            View::Rankings => rankings_json(report)?,
        };
        println!("{json}");
    } else {
        match opts.view {
            View::Full => print_report_table(report, opts.use_color),
            View::Shift => print_shift_table(report, opts.use_color),
            View::Daily => print_daily_table(report, opts.use_color),
            View::Rankings => print_rankings_table(report, opts.use_color),
        }
    }
    Ok(())
}

/// Run the parsed command line to completion
pub(crate) async fn run(cli: Cli, config: Config) -> Result<(), AppError> {
    let cli = cli.with_config(&config);
    let settings = Settings::resolve(&cli, &config)?;
    let source = open_source(&settings.source)?;
    let opts = RenderOptions {
        view: View::of(cli.command.as_ref()),
        json: cli.json,
        use_color: cli.use_color(),
    };

    match cli.command {
        Some(Commands::Watch) => watch(source, settings, cli.window, opts).await,
        _ => {
            let facade = ReportFacade::new(source, settings.clock, settings.options);
            let report = facade
                .build_report(&settings.categories, &cli.window, settings.now())
                .await?;
            render(&report, opts)
        }
    }
}

/// Rebuild on every change tick until Ctrl-C or the feed closes.
///
/// Builds run concurrently; a result is printed only if no newer build has
/// been printed before it.
async fn watch(
    source: SharedSource,
    settings: Settings,
    window: String,
    opts: RenderOptions,
) -> Result<(), AppError> {
    // reject a bad window before waiting on the feed
    settings.clock.named_window(&window, settings.now())?;

    let mut ticks = source.subscribe();
    info!(source = source.display_name(), "watching for changes");
    let facade = Arc::new(ReportFacade::new(source, settings.clock, settings.options));
    let sequencer = Arc::new(RequestSequencer::new());
    let settings = Arc::new(settings);
    let window: Arc<str> = window.into();

    let spawn_build = move || {
        let ticket = sequencer.next_ticket();
        let facade = Arc::clone(&facade);
        let sequencer = Arc::clone(&sequencer);
        let settings = Arc::clone(&settings);
        let window = Arc::clone(&window);
        tokio::spawn(async move {
            if sequencer.is_superseded(ticket) {
                debug!(?ticket, "skipped superseded build");
                return;
            }
            match facade
                .build_report(&settings.categories, &window, settings.now())
                .await
            {
                Ok(report) if sequencer.accept(ticket) => {
                    if let Err(e) = render(&report, opts) {
                        warn!(error = %e, "render failed");
                    }
                }
                Ok(_) => debug!(?ticket, "discarded stale report"),
                Err(e) => warn!(?ticket, error = %e, "report build failed"),
            }
        });
    };

    spawn_build();

    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            tick = ticks.recv() => match tick {
                Ok(()) => spawn_build(),
                Err(RecvError::Lagged(missed)) => {
                    debug!(missed, "change ticks coalesced");
                    spawn_build();
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CounterBasis, SourceKind};
    use crate::core::DayPolicy;
    use chrono::NaiveTime;
    use clap::Parser;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("shiftstats").chain(args.iter().copied()))
    }

    #[test]
    fn defaults_resolve_to_kyiv_shift_clock() {
        let settings = Settings::resolve(&cli(&[]), &Config::default()).unwrap();
        assert_eq!(settings.clock, ShiftClock::default());
        assert_eq!(settings.categories, CategorySet::all());
        assert_eq!(settings.options, ReportOptions::default());
        assert!(settings.now.is_none());
    }

    #[test]
    fn config_values_are_applied() {
        let config = Config {
            shift_boundary: Some("05:30".to_string()),
            day_policy: Some(DayPolicy::Rolling),
            counter_basis: Some(CounterBasis::Rollups),
            top_crews: Some(3),
            ..Default::default()
        };
        let settings = Settings::resolve(&cli(&[]), &config).unwrap();
        assert_eq!(
            settings.clock.boundary(),
            NaiveTime::from_hms_opt(5, 30, 0).unwrap()
        );
        assert_eq!(settings.clock.day_policy(), DayPolicy::Rolling);
        assert_eq!(settings.options.counter_basis, CounterBasis::Rollups);
        assert_eq!(settings.options.top_crews, 3);
    }

    #[test]
    fn top_limit_overrides_every_ranking() {
        let settings = Settings::resolve(&cli(&["top", "--limit", "2"]), &Config::default()).unwrap();
        assert_eq!(settings.options.top_directions, 2);
        assert_eq!(settings.options.top_frequency_bands, 2);
        assert_eq!(settings.options.top_crews, 2);
    }

    #[test]
    fn categories_and_source_from_flags() {
        let settings = Settings::resolve(
            &cli(&["-C", "fpv", "--source", "sqlite:/tmp/f.db"]),
            &Config::default(),
        )
        .unwrap();
        assert!(settings.categories.contains(Category::Fpv));
        assert!(!settings.categories.contains(Category::Molniya));
        assert_eq!(settings.source.kind, Some(SourceKind::Sqlite));
    }

    #[test]
    fn invalid_inputs_are_errors() {
        let config = Config::default();
        assert!(matches!(
            Settings::resolve(&cli(&["-C", "drone"]), &config),
            Err(AppError::InvalidCategory { .. })
        ));
        assert!(matches!(
            Settings::resolve(&cli(&["--timezone", "Mars/Base"]), &config),
            Err(AppError::InvalidTimezone { .. })
        ));
        assert!(matches!(
            Settings::resolve(&cli(&["--now", "yesterday"]), &config),
            Err(AppError::InvalidInstant { .. })
        ));
        let bad_boundary = Config {
            shift_boundary: Some("25:00".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            Settings::resolve(&cli(&[]), &bad_boundary),
            Err(AppError::InvalidTime { .. })
        ));
    }

    #[test]
    fn now_is_read_in_target_zone() {
        let settings =
            Settings::resolve(&cli(&["--now", "2025-01-10T10:00"]), &Config::default()).unwrap();
        // Kyiv is UTC+2 in January
        assert_eq!(
            settings.now.unwrap(),
            DateTime::parse_from_rfc3339("2025-01-10T08:00:00Z").unwrap()
        );
    }

    #[test]
    fn view_follows_command() {
        assert_eq!(View::of(None), View::Full);
        assert_eq!(View::of(Some(&Commands::Shift)), View::Shift);
        assert_eq!(View::of(Some(&Commands::Daily)), View::Daily);
        assert_eq!(View::of(Some(&Commands::Top { limit: None })), View::Rankings);
    }
}

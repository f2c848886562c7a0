//! pbi-autopilot
//!
//! CLI entry point: the refresh daemon plus one-shot commands.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pbi_autopilot::app::{Automation, Daemon, report_outcome};
use pbi_autopilot::routines::{Outcome, PageKind};
use pbi_autopilot::schedule::{Interval, parse_interval};
use pbi_autopilot::settings::SettingsStore;
use pbi_autopilot::{Config, default_state_path, load_yaml_config};

/// Keeps Power BI semantic models and reports refreshed on a schedule
#[derive(Parser, Debug)]
#[command(name = "pbi-autopilot")]
#[command(version)]
struct Cli {
    /// YAML config file (default: <config dir>/pbi-autopilot/config.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Settings file (default: <data dir>/pbi-autopilot/settings.json)
    #[arg(long, global = true)]
    state: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the daemon: schedules, full-screen watcher and stdin commands
    Run {
        #[arg(long)]
        url: Option<String>,
        /// Start auto-refresh immediately, with fresh countdowns
        #[arg(long)]
        autostart: bool,
    },
    /// Refresh the current page once and exit
    Once {
        #[arg(long)]
        url: Option<String>,
        /// Only act if the page is of this kind (semantic-model | report)
        #[arg(long)]
        kind: Option<PageKind>,
    },
    /// Put the report into full-screen and exit
    FullScreen {
        #[arg(long)]
        url: Option<String>,
    },
    /// Wait for a CSS selector to become visible and print its text
    Probe {
        selector: String,
        #[arg(long, default_value_t = 10_000)]
        timeout_ms: u64,
        #[arg(long)]
        url: Option<String>,
    },
    /// Inspect or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    /// Print stored settings and effective intervals
    Show,
    /// Store a refresh interval, e.g. `set-interval report 30m`
    SetInterval { kind: PageKind, duration: String },
    /// Store how often a report is put back into full-screen, e.g. `2h`
    SetFullScreenInterval { duration: String },
}

fn with_url(mut config: Config, url: Option<String>) -> Result<Config> {
    if let Some(url) = url {
        config.target_url = url;
        config.validate()?;
    }
    Ok(config)
}

/// Log a one-shot routine's outcome, then release the browser
async fn finish(automation: &Automation, what: &str, outcome: Result<Outcome>) -> Result<()> {
    let failed = outcome.is_err();
    report_outcome(what, outcome);
    automation.manager().shutdown().await?;
    if failed {
        anyhow::bail!("{what} did not complete");
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_yaml_config(cli.config.as_deref())?;
    let state_path = cli.state.unwrap_or_else(default_state_path);

    match cli.command {
        Commands::Run { url, autostart } => {
            let config = with_url(config, url)?;
            let store = SettingsStore::open(&state_path)?;
            info!("Starting pbi-autopilot v{}", env!("CARGO_PKG_VERSION"));
            Daemon::new(config, store)?.run(autostart).await
        }
        Commands::Once { url, kind } => {
            let automation = Automation::new(&with_url(config, url)?);
            let outcome = automation.run_cycle(kind).await;
            finish(&automation, "Refresh", outcome).await
        }
        Commands::FullScreen { url } => {
            let automation = Automation::new(&with_url(config, url)?);
            let outcome = automation.enter_full_screen().await;
            finish(&automation, "Full-screen", outcome).await
        }
        Commands::Probe {
            selector,
            timeout_ms,
            url,
        } => {
            let automation = Automation::new(&with_url(config, url)?);
            let found = automation.probe(&selector, timeout_ms).await;
            automation.manager().shutdown().await?;
            match found? {
                Some(text) => println!("visible: {}", text.trim()),
                None => println!("{selector} not visible within {timeout_ms}ms"),
            }
            Ok(())
        }
        Commands::Settings { action } => {
            let store = SettingsStore::open(&state_path)?;
            match action {
                SettingsAction::Show => {
                    println!("{}", store.path().display());
                    println!("{}", serde_json::to_string_pretty(&store.snapshot())?);
                    for kind in PageKind::SCHEDULED {
                        let default = Interval::from_secs(config.default_interval_secs(kind))?;
                        println!("{kind}: every {}", store.interval_for(kind, default));
                    }
                    let default = Interval::from_secs(config.schedule.full_screen_interval_secs)?;
                    println!("full-screen upkeep: every {}", store.full_screen_interval(default));
                }
                SettingsAction::SetInterval { kind, duration } => {
                    let interval = parse_interval(&duration)
                        .with_context(|| format!("Invalid interval for {kind}"))?;
                    store.set_interval_for(kind, interval)?;
                    println!("{kind}: every {interval}");
                }
                SettingsAction::SetFullScreenInterval { duration } => {
                    let interval =
                        parse_interval(&duration).context("Invalid full-screen interval")?;
                    store.set_full_screen_interval(interval)?;
                    println!("full-screen upkeep: every {interval}");
                }
            }
            Ok(())
        }
    }
}

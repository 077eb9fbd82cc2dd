use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueHint};
use engine_logging::engine_info;
use log::LevelFilter;
use recap_app::logging::{self, LogDestination};
use recap_app::{AppConfig, ChannelPreference, HandoffOutcome, JobCoordinator, DEFAULT_CONFIG_FILE};
use recap_core::{AppViewModel, JobStatus};
use recap_engine::Navigator;

#[derive(Parser, Debug)]
#[command(author, version, about = "Upload a film-log export and follow its year-in-review analysis", long_about = None)]
struct Cli {
    /// Export archive to analyze
    #[arg(value_hint = ValueHint::FilePath)]
    archive: Option<PathBuf>,

    /// RON configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE, value_hint = ValueHint::FilePath)]
    config: PathBuf,

    /// Analysis server base URL
    #[arg(long)]
    base_url: Option<String>,

    /// How to observe progress after the upload
    #[arg(long, value_enum)]
    channel: Option<ChannelPreference>,

    /// Milliseconds between progress polls
    #[arg(long)]
    poll_interval_ms: Option<u64>,

    /// Consecutive failed polls before giving up
    #[arg(long)]
    max_poll_failures: Option<u32>,

    /// Directory the finished result is stored in
    #[arg(long, value_hint = ValueHint::DirPath)]
    storage_dir: Option<PathBuf>,

    /// Storage key of the finished result
    #[arg(long)]
    result_key: Option<String>,

    /// Milliseconds to wait before moving on to the results
    #[arg(long)]
    navigation_delay_ms: Option<u64>,

    /// Print the stored result of the last analysis and exit
    #[arg(long)]
    show_result: bool,

    /// Print progress snapshots as JSON lines
    #[arg(long)]
    json: bool,

    /// Where log output goes
    #[arg(long, value_enum, default_value_t = LogDestination::File)]
    log: LogDestination,

    /// Log debug messages
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(channel) = self.channel {
            config.channel = channel;
        }
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(max) = self.max_poll_failures {
            config.max_consecutive_poll_failures = max;
        }
        if let Some(dir) = &self.storage_dir {
            config.storage_dir = dir.clone();
        }
        if let Some(key) = &self.result_key {
            config.result_key = key.clone();
        }
        if let Some(ms) = self.navigation_delay_ms {
            config.navigation_delay_ms = ms;
        }
    }
}

/// Prints where the results would be shown.
struct ConsoleNavigator;

impl Navigator for ConsoleNavigator {
    fn navigate(&self, route: &str) {
        println!("Results ready: {route}");
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    logging::initialize(cli.log, level, &logging::default_log_path());

    let mut config = AppConfig::load_or_default(&cli.config);
    cli.apply_overrides(&mut config);
    engine_info!("Using analysis server {}", config.base_url);

    let mut coordinator = JobCoordinator::new(&config, Arc::new(ConsoleNavigator))
        .context("failed to start the transfer engine")?;

    if cli.show_result {
        let store = coordinator.result_store();
        let stored = store
            .load()
            .with_context(|| format!("failed to read {}", store.path().display()))?;
        match stored {
            Some(result) => println!("{}", serde_json::to_string_pretty(&result)?),
            None => println!("No analysis result stored yet."),
        }
        return Ok(());
    }

    coordinator.submit(cli.archive.as_deref());
    render(&coordinator.snapshot(), cli.json)?;

    while !coordinator.is_settled() {
        if coordinator.wait(Duration::from_millis(100)) {
            render(&coordinator.snapshot(), cli.json)?;
        }
    }

    let view = coordinator.snapshot();
    if let Some(HandoffOutcome::Failed { message, .. }) = coordinator.handoff() {
        bail!("analysis finished but the result could not be stored: {message}");
    }
    coordinator.dispose();
    match (view.status, view.error) {
        (JobStatus::Complete, _) => Ok(()),
        (_, Some(error)) => bail!(error),
        (_, None) => bail!("no analysis was started"),
    }
}

fn render(view: &AppViewModel, json: bool) -> Result<()> {
    let mut out = io::stdout().lock();
    if json {
        serde_json::to_writer(&mut out, view)?;
        writeln!(out)?;
        return Ok(());
    }
    if !view.shows_progress() {
        return Ok(());
    }
    writeln!(
        out,
        "[{:>3}%] {} {}",
        view.percent, view.current_icon, view.current_label
    )?;
    Ok(())
}

//! botcast-send - Background daemon for periodic posting
//!
//! Generates, vets and publishes a post every interval until stopped.

use clap::Parser;
use libbotcast::{BotcastError, Config, CycleOutcome, Result, Scheduler};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "botcast-send")]
#[command(version)]
#[command(about = "Background daemon for periodic posting")]
#[command(long_about = "\
botcast-send - Background daemon for periodic posting

DESCRIPTION:
    botcast-send is a long-running daemon. Every interval it refreshes the
    account's access token, asks the configured text generator for a draft,
    fits the draft to the content policy, rejects repeats of earlier posts
    and publishes the result, as a numbered thread when it is long.

    A cycle that fails is logged and skipped; the daemon keeps running.

USAGE:
    # Run in foreground (logs to stderr)
    botcast-send

    # Post every 90 minutes
    botcast-send --interval 90m

    # Generate and log posts without publishing anything
    botcast-send --dry-run --once --verbose

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current cycle)

CONFIGURATION:
    Configuration file: ~/.config/botcast/config.toml (or $BOTCAST_CONFIG)
    Data directory:     ~/.local/share/botcast
                        (tokens.json, history.jsonl, site_usage.json)

    Run `botcast-auth` once to authorize the account before starting.

ENVIRONMENT:
    BOTCAST_LOG_FORMAT  text | json | pretty (default: text)
    BOTCAST_LOG_LEVEL   tracing filter, e.g. debug or libbotcast=trace

EXIT CODES:
    0 - Clean shutdown
    1 - Runtime or configuration error (or a failed --once cycle)
    2 - Authentication error (missing or unusable tokens)
")]
struct Cli {
    /// Configuration file (overrides $BOTCAST_CONFIG and the default path)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Posting interval (overrides config)
    #[arg(long, value_name = "DURATION")]
    #[arg(help = "Time between posts, e.g. 1h or 45m (minimum 60s)")]
    interval: Option<String>,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    #[arg(help = "Enable verbose logging (useful for debugging)")]
    verbose: bool,

    /// Log posts instead of publishing them
    #[arg(long)]
    #[arg(help = "Generate and log posts without publishing or recording them")]
    dry_run: bool,

    /// Run once and exit (for testing)
    #[arg(long)]
    #[arg(help = "Run a single cycle and exit (for testing or cron)")]
    once: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    libbotcast::logging::init_default(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if let Some(interval) = cli.interval {
        config.schedule.interval = interval;
        config.validate()?;
    }

    let mut scheduler = Scheduler::from_config(config, cli.dry_run)?;
    info!(
        "botcast-send starting{}",
        if cli.dry_run { " (dry run)" } else { "" }
    );

    if cli.once {
        let outcome = scheduler.run_cycle().await;
        info!("botcast-send: cycle {}, exiting", outcome);
        return Ok(match outcome {
            CycleOutcome::Failed => 1,
            _ => 0,
        });
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    scheduler.run(shutdown).await;

    info!("botcast-send daemon stopped");
    Ok(0)
}

/// Set up signal handlers for graceful shutdown
#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;
    use std::sync::atomic::Ordering;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| BotcastError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            info!("Received signal {}, stopping after the current cycle...", sig);
            shutdown.store(true, Ordering::SeqCst);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

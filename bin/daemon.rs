// dkb2ynab - Sync Daemon
// Polls a WebDAV folder for DKB exports and uploads YNAB files

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use dkb2ynab::logging::{default_level, init_tracing};
use dkb2ynab::{ConversionOptions, Daemon, DaemonConfig};

/// Settings come from the environment (and a .env file if present)
#[derive(Parser, Debug)]
#[command(name = "dkb2ynab-daemon", version, about = "Sync DKB exports from WebDAV into YNAB files")]
struct Cli {
    /// Run a single iteration and exit
    #[arg(long)]
    once: bool,

    /// Skip malformed rows instead of rejecting the whole file
    #[arg(long)]
    skip_invalid: bool,

    /// More log output (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    init_tracing(default_level(cli.verbose, 0));

    let config = DaemonConfig::from_env().context("Invalid daemon configuration")?;
    info!(
        host = %config.webdav.host,
        csv_folder = %config.csv_folder,
        ynab_folder = %config.ynab_folder,
        workdir = %config.workdir.display(),
        interval = config.interval.as_secs(),
        "starting dkb2ynab daemon {}",
        dkb2ynab::VERSION
    );

    let options = ConversionOptions {
        skip_invalid: cli.skip_invalid,
        ..Default::default()
    };
    let mut daemon = Daemon::new(config, options)?;

    if cli.once {
        daemon.run_once()?;
        return Ok(());
    }
    daemon.run()
}

use attendance_notifier::{
    Config, NotificationRouter, Notifier, Pipeline, PortalClient, ScraperError, StdoutNotifier,
    notifier_from_config,
};
use clap::Parser;
use std::io;
use std::path::PathBuf;
use std::process;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Logs into the student portal and sends the current attendance report.
#[derive(Parser, Debug)]
#[command(name = "attendance-notifier", version)]
struct Cli {
    /// Read settings from this file before the environment (default: ./.env if present).
    #[arg(long, value_name = "PATH")]
    env_file: Option<PathBuf>,

    /// Print the message instead of sending it.
    #[arg(long)]
    dry_run: bool,

    /// Also print the extracted records as JSON.
    #[arg(long)]
    print_records: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    process::exit(run(cli).await);
}

async fn run(cli: Cli) -> i32 {
    match &cli.env_file {
        Some(path) => {
            if let Err(e) = dotenvy::from_path(path) {
                error!("Could not read {}: {}", path.display(), e);
                return 2;
            }
        }
        None => {
            dotenvy::dotenv().ok();
        }
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return 2;
        }
    };
    info!(
        "Checking attendance for {} at {}",
        config.credential.masked_identifier(),
        config.login_url
    );

    let client = match PortalClient::from_config(&config) {
        Ok(client) => client,
        Err(e) => return startup_failure(e),
    };
    let notifier: Box<dyn Notifier> = if cli.dry_run {
        Box::new(StdoutNotifier)
    } else {
        match notifier_from_config(&config) {
            Ok(notifier) => notifier,
            Err(e) => return startup_failure(e),
        }
    };

    let pipeline = Pipeline::new(&config, client, NotificationRouter::new(notifier));
    let report = pipeline.run().await;

    if cli.print_records {
        match serde_json::to_string_pretty(report.outcome.extraction.records()) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Could not print records: {}", e),
        }
    }

    report.exit_code()
}

fn startup_failure(err: ScraperError) -> i32 {
    error!("{}", err);
    match err {
        ScraperError::ConfigMissing(_) | ScraperError::ConfigInvalid { .. } => 2,
        _ => 6,
    }
}

use std::{
    env,
    error::Error,
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use mailgate_core::{load_config, Config, EmailMessage, Gatekeeper, TracingObserver};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "mailgate.toml";
const CONFIG_ENV: &str = "MAILGATE_CONFIG";

/// Relays raw `.eml` files through the Mailgate recipient gatekeeper.
#[derive(Parser, Debug)]
#[command(name = "mailgate-relay", version, about)]
struct RelayArgs {
    /// Configuration file, overrides `MAILGATE_CONFIG` and `mailgate.toml`
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Raw email files to relay
    #[arg(required = true, value_name = "FILE.eml")]
    files: Vec<PathBuf>,
}

/// Loads the configuration from the explicit path, the environment or the
/// default location, in that order.
///
/// Only a missing file at the default location falls back to the default
/// configuration, any other failure is reported.
fn resolve_config(explicit: Option<&Path>) -> Result<Config, Box<dyn Error>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => match env::var(CONFIG_ENV) {
            Ok(path) => PathBuf::from(path),
            Err(_) => {
                let path = PathBuf::from(DEFAULT_CONFIG);
                if !path.exists() {
                    warn!(path = %path.display(), "No configuration file found, using defaults");
                    return Ok(Config::default());
                }
                path
            }
        },
    };
    info!(path = %path.display(), "Loading configuration");
    Ok(load_config(&path)?)
}

/// Relays every file through the gatekeeper, returning the number of
/// files that could not be read or delivered.
async fn relay_files(gatekeeper: &Gatekeeper, files: &[PathBuf]) -> usize {
    let mut failures = 0;
    for path in files {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) => {
                error!(path = %path.display(), error = %e, "Failed to read email file");
                failures += 1;
                continue;
            }
        };

        let mut message = EmailMessage::parse(&raw);
        match gatekeeper.deliver(&mut message).await {
            Ok(report) => info!(
                path = %path.display(),
                message_id = %message.message_id,
                delivered = report.delivered,
                rejected = report.rejected.len(),
                "Processed email"
            ),
            Err(e) => {
                error!(
                    path = %path.display(),
                    message_id = %message.message_id,
                    error = %e,
                    "Failed to deliver email"
                );
                failures += 1;
            }
        }
    }
    failures
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = RelayArgs::parse();
    let config = resolve_config(args.config.as_deref())?;

    let gatekeeper = Gatekeeper::new(config.gatekeeper)?.with_observer(Arc::new(TracingObserver));
    info!(
        transport = gatekeeper.transport().name(),
        whitelist = %gatekeeper.whitelist(),
        files = args.files.len(),
        "Mailgate relay starting"
    );

    let failures = relay_files(&gatekeeper, &args.files).await;
    if failures > 0 {
        return Err(format!("{failures} of {} emails failed", args.files.len()).into());
    }
    Ok(())
}

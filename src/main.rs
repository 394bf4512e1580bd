use std::error::Error;
use std::path::PathBuf;

use tracing::{debug, error, warn};

use slot_checker::checker::Checker;
use slot_checker::config::Config;
use slot_checker::error::SlotCheckerError;
use slot_checker::logging;

struct Flags {
    verbose: bool,
    config_path: Option<PathBuf>,
}

fn parse_flags(args: &[String]) -> Flags {
    let mut verbose = false;
    let mut config_path = None;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-v" | "--verbose" => {
                verbose = true;
                i += 1;
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 2;
                } else {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    Flags {
        verbose,
        config_path,
    }
}

async fn run(config_path: PathBuf) -> Result<(), SlotCheckerError> {
    let config = Config::load(&config_path)?;
    Checker::new(config, config_path).run().await
}

#[tokio::main]
async fn main() {
    let args: Vec<String> = std::env::args().collect();
    let flags = parse_flags(&args);
    let verbose = flags.verbose || std::env::var_os("SLOT_CHECKER_DEBUG").is_some();
    logging::init(verbose);

    let config_path = flags
        .config_path
        .or_else(|| std::env::var_os("SLOT_CHECKER_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("config.yml"));

    if let Err(err) = run(config_path).await {
        error!("Aborting following an error while running the slot checker");
        error!("{err}");
        if verbose {
            let mut source = err.source();
            while let Some(cause) = source {
                debug!("caused by: {cause}");
                source = cause.source();
            }
        } else {
            warn!("Error details may be suppressed. Activate debug logs to see them.");
        }
        std::process::exit(err.exit_code());
    }
}

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Install the process-wide subscriber. Debug level exposes retry attempts
/// and full error chains; normal operation stays at info.
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder().with_max_level(level).finish();
    tracing::subscriber::set_global_default(subscriber).ok(); // Ignore err when already installed
}

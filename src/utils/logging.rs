//! Diagnostic output for the relay and the CLI.
//!
//! Events go to stderr so that `say` and `chat` can keep stdout for replies.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter directives read before `RUST_LOG`.
pub const LOG_ENV: &str = "PERSONA_RELAY_LOG";

const DEFAULT_DIRECTIVES: &str = "info";
const VERBOSE_DIRECTIVES: &str = "debug,hyper=info,reqwest=info";

/// Picks the filter directives: `--verbose`, then [`LOG_ENV`], then
/// `RUST_LOG`, then `info`. Blank variables are skipped.
pub fn filter_directives<F>(verbose: bool, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if verbose {
        return VERBOSE_DIRECTIVES.to_string();
    }
    [LOG_ENV, "RUST_LOG"]
        .into_iter()
        .filter_map(&lookup)
        .map(|value| value.trim().to_string())
        .find(|value| !value.is_empty())
        .unwrap_or_else(|| DEFAULT_DIRECTIVES.to_string())
}

/// Installs the global subscriber. Later calls are ignored.
pub fn init(verbose: bool) {
    let directives = filter_directives(verbose, |name| std::env::var(name).ok());
    let filter = EnvFilter::try_new(&directives).unwrap_or_else(|err| {
        eprintln!("⚠️  Ignoring invalid log filter '{directives}': {err}");
        EnvFilter::new(DEFAULT_DIRECTIVES)
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init();
}

//! Tracing initialisation shared by the binaries.

use tracing_subscriber::EnvFilter;

/// Target used for verbose prompt logging.
pub const PROMPT_TARGET: &str = "textgen::prompt";

/// Build the filter used by [`init_tracing`].
///
/// `debug` forces debug output for the textgen crates. Otherwise `RUST_LOG`
/// wins, falling back to `info` so that load timings and warnings are shown.
pub fn env_filter(debug: bool) -> EnvFilter {
    if debug {
        EnvFilter::new("textgen=debug,textgen_cli=debug,textgen_common=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Install the global tracing subscriber writing to stderr.
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(debug: bool) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(debug))
        .with_target(debug)
        .with_ansi(false)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_filter_mentions_crates() {
        let filter = env_filter(true).to_string();
        assert!(filter.contains("textgen=debug"));
    }

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false);
        init_tracing(true);
    }
}

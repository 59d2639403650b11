/*!
    Log output for the `stylize` binary.
*/

use tracing_subscriber::EnvFilter;

/**
    Install the global subscriber, writing to stderr.

    `RUST_LOG` takes precedence; otherwise everything at `info` and above is
    shown, or `debug` and above when `verbose` is set.
*/
pub fn init(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

use tracing::Level;

/// Install the process-wide subscriber once, from parsed flags.
///
/// Diagnostics go to stderr so stdout only carries the report (JSON output
/// stays machine-readable).
pub fn init(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

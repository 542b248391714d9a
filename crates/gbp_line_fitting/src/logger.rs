//! Logging setup of the binary

use tracing::Level;

/// Initialize the tracing subscriber with `default_level`, which can be
/// overridden with the `RUST_LOG` environment variable:
/// ```bash
/// RUST_LOG=gbp_solver=trace gbp_line_fitting
/// ```
pub fn init_logger(default_level: Level) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(default_level.into())
                .from_env_lossy(),
        )
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}

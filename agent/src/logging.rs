//! Diagnostic tracing for the agent.
//!
//! Traces go to stderr and are filtered by `RUST_LOG`. They are separate
//! from the per-round plan/result logs written under `log_dir`
//! (`io/iteration_log`), which do not depend on the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber. Defaults to `warn` when `RUST_LOG` is unset.
///
/// # Example
/// ```bash
/// RUST_LOG=agent=info agent plan "plot US unemployment"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

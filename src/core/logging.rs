//! Diagnostic logging to stderr.
//!
//! Diagnostics are not the audit trail: traces under the workspace are always
//! written, whatever the filter says.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub const LOG_ENV: &str = "GATEHOUSE_LOG";

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "gatehouse=debug" } else { "gatehouse=warn" }
}

/// Install the global subscriber. `GATEHOUSE_LOG` wins over `verbose`.
///
/// ```bash
/// GATEHOUSE_LOG=gatehouse=trace gatehouse gate --payload req.json
/// ```
pub fn init_logging(verbose: bool) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    // A subscriber may already be installed (tests, embedding hosts).
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}

//! # Node Logging
//!
//! Sets up `tracing` for `parcel-node`. Registry events (payment methods
//! approved, properties listed, rejected calls) come from `parcel_contracts`;
//! request spans come from `tower_http`.
//!
//! Output goes to stderr. `init` prints its summary on stdout and the two
//! must not interleave.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter for `run`: registry events at info, one span per HTTP request.
pub const RUN_FILTER: &str = "parcel_node=info,parcel_contracts=info,tower_http=debug";

/// Filter for `init`: no HTTP stack is running.
pub const INIT_FILTER: &str = "parcel_node=info,parcel_contracts=info";

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Colored, with file and line. For a terminal.
    Pretty,
    /// One JSON object per line. For log shippers.
    Json,
}

impl LogFormat {
    /// `json` (any case) selects [`LogFormat::Json`]; anything else is
    /// [`LogFormat::Pretty`].
    pub fn from_str_lossy(s: &str) -> Self {
        if s.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Pretty
        }
    }
}

/// `RUST_LOG` wins when set and parseable, e.g.
/// `RUST_LOG=parcel_contracts=debug` to see missed lookups.
fn env_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Installs the global subscriber. Panics if one is already installed.
pub fn init_logging(default_filter: &str, format: LogFormat) {
    let filter = env_filter(default_filter);

    match format {
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_file(true)
                    .with_line_number(true),
            )
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_current_span(false),
            )
            .init(),
    }

    tracing::debug!(?format, filter = default_filter, "parcel-node logging ready");
}

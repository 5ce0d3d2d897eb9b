//! Tracing subscriber setup for the player binary.
//!
//! The library only emits `tracing` events; installing a subscriber is left to
//! the embedding application.  `ink` calls [`init_tracing`] once at startup.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "INK_LOG";

/// Filter used when neither `INK_LOG` nor the config file names one.
pub const DEFAULT_FILTER: &str = "ink=info";

/// Filter selected by `-d`.
pub const DEBUG_FILTER: &str = "ink=debug";

static INIT: Once = Once::new();

/// Install the global subscriber, logging to stderr.
///
/// `INK_LOG` (e.g. `INK_LOG=ink::story=debug`) wins over `default_filter`;
/// an unparsable `default_filter` falls back to [`DEFAULT_FILTER`].  Calls
/// after the first are no-ops.
pub fn init_tracing(default_filter: &str) {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_env(LOG_ENV)
            .or_else(|_| EnvFilter::try_new(default_filter))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true),
            )
            .with(filter)
            .init();
    });
}

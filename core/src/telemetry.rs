//! Tracing-subscriber setup shared by every binary in the workspace:
//! pretty-printed in debug builds, JSON with span context in release,
//! `RUST_LOG` takes priority over the caller-supplied default level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the process-wide tracing subscriber. `crate_name` scopes the
/// default filter to this binary's own target in addition to `log_level`
/// globally, e.g. `init("info", "worker")` yields `info,worker=info` unless
/// `RUST_LOG` is set.
pub fn init(log_level: &str, crate_name: &str) {
    let default_filter = format!("{log_level},{crate_name}={log_level}");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().pretty().with_target(false))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().json().with_current_span(true))
            .try_init()
            .ok();
    }
}

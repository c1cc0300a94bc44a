//! Structured logging setup.
//!
//! Priority: `RUST_LOG` > `[logging] level` from the config > "info".
//! Debug builds print human-readable lines; release builds emit JSON with
//! the current span, so every event of a chat request carries its
//! `request_id`. Output goes to stderr to keep stdout for `smartmove ask`.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_telemetry_with_level(log_level: &str) {
    let default_filter = format!("warn,smartmove={},tower_http={}", log_level, log_level);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_filter));

    #[cfg(debug_assertions)]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
            .try_init()
            .ok();
    }

    #[cfg(not(debug_assertions))]
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .ok();
    }
}

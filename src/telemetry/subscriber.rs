use super::config::TelemetryConfig;
use std::sync::OnceLock;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Returned by [`init_telemetry`]; hold it for the lifetime of the process.
pub struct TelemetryGuard {
    _private: (),
}

static TELEMETRY_INIT: OnceLock<()> = OnceLock::new();

/// Initialize the global tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise `config.log_filter`. Subsequent calls are
/// no-ops, and so is the first one if another global subscriber was already
/// installed.
pub fn init_telemetry(config: TelemetryConfig) -> TelemetryGuard {
    TELEMETRY_INIT.get_or_init(|| {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

        let span_events = if config.log_span_close {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let fmt_layer = fmt::layer()
            .with_target(config.show_target)
            .with_ansi(config.enable_console_colors)
            .with_span_events(span_events);

        let _ = tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init();
    });

    TelemetryGuard { _private: () }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let _a = init_telemetry(TelemetryConfig::default());
        let _b = init_telemetry(TelemetryConfig {
            log_filter: "debug".into(),
            ..TelemetryConfig::default()
        });
        tracing::info!("telemetry initialised twice without panicking");
    }
}

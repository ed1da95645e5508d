/// Configuration for the global tracing subscriber.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter used when `RUST_LOG` is unset (e.g. "info", "rum_bbs_indexer=debug,warn").
    pub log_filter: String,
    /// ANSI-colored console output.
    pub enable_console_colors: bool,
    /// Include the target module in each line.
    pub show_target: bool,
    /// Emit an event when a span closes, carrying its busy/idle time.
    /// Useful to see how long each polling cycle took.
    pub log_span_close: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: "info,sqlx=warn".into(),
            enable_console_colors: true,
            show_target: true,
            log_span_close: false,
        }
    }
}

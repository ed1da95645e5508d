//! Logging helpers (thin wrappers over `tracing`).
//!
//! These helpers emit through whatever subscriber is active for the current
//! span. They never install a subscriber themselves; the poller runs inside an
//! injected span so library users and tests decide where output goes.

/// Returns true when helper output is suppressed via `RUM_INDEXER_SILENT`.
fn silenced() -> bool {
    std::env::var("RUM_INDEXER_SILENT").is_ok()
}

/// Logs indexer startup information
pub fn log_startup(quorum_url: &str, groups: &[String], poll_interval_ms: u64) {
    if silenced() {
        return;
    }

    tracing::info!(
        quorum_url = redact_jwt(quorum_url),
        groups = groups.join(", "),
        poll_interval_ms = poll_interval_ms,
        "RUM BBS Indexer Startup"
    );
}

/// Masks the value of the `jwt` query parameter some node URLs carry.
pub fn redact_jwt(url: &str) -> String {
    let Some(pos) = url.find("jwt=") else {
        return url.to_string();
    };
    let value_start = pos + "jwt=".len();
    let value_end = url[value_start..]
        .find('&')
        .map_or(url.len(), |end| value_start + end);
    format!("{}[REDACTED]{}", &url[..value_start], &url[value_end..])
}

/// Logs a section header
pub fn log_section(title: &str) {
    tracing::info!("=== {} ===", title);
}

/// Logs the summary of one polling cycle over all groups.
pub fn log_cycle(fetched: usize, applied: usize, pending_resolved: usize, duration_ms: u64) {
    if silenced() {
        return;
    }
    if fetched > 0 || pending_resolved > 0 {
        tracing::info!(
            fetched = fetched,
            applied = applied,
            pending_resolved = pending_resolved,
            duration_ms = duration_ms,
            "Cycle processed"
        );
    }
}

/// Logs an error with context
pub fn log_error(context: &str, error: &str) {
    tracing::error!(context = context, error = error, "Indexer Error");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jwt_is_redacted() {
        assert_eq!(
            redact_jwt("http://127.0.0.1:8002?jwt=secret"),
            "http://127.0.0.1:8002?jwt=[REDACTED]"
        );
        assert_eq!(
            redact_jwt("https://node:8002/?jwt=abc.def&timeout=5"),
            "https://node:8002/?jwt=[REDACTED]&timeout=5"
        );
        assert_eq!(redact_jwt("http://127.0.0.1:8002"), "http://127.0.0.1:8002");
    }
}

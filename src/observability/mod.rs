use tracing_subscriber::EnvFilter;

/// Map a configured log level to a tracing filter directive.
///
/// Returns `None` for `DISABLED`. Unknown levels fall back to `INFO`.
#[must_use]
pub fn filter_directive(log_level: &str) -> Option<&'static str> {
    match log_level.trim().to_uppercase().as_str() {
        "DISABLED" => None,
        "DEBUG" => Some("DEBUG"),
        "WARNING" | "WARN" => Some("WARN"),
        "ERROR" | "CRITICAL" => Some("ERROR"),
        _ => Some("INFO"),
    }
}

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
pub fn init_tracing(log_level: &str) {
    let Some(directive) = filter_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directive_mapping() {
        assert_eq!(filter_directive("DISABLED"), None);
        assert_eq!(filter_directive("warning"), Some("WARN"));
        assert_eq!(filter_directive("CRITICAL"), Some("ERROR"));
        assert_eq!(filter_directive("Debug"), Some("DEBUG"));
        assert_eq!(filter_directive("INFO"), Some("INFO"));
        assert_eq!(filter_directive("nonsense"), Some("INFO"));
    }
}

use tracing_subscriber::EnvFilter;

/// Initialize structured logging with JSON output.
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific default level.
pub fn init_with_level(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        )
        .json()
        .init();
}

/// Initialize logging for tests (plain format, safe to call repeatedly).
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::{debug, info, warn};

    #[test]
    fn test_logging_init() {
        init_test();
        info!("peer up");
        warn!("watchdog slow");
        debug!("frame decoded");
    }
}

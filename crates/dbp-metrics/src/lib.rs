use lazy_static::lazy_static;
use prometheus::{Counter, Encoder, IntGauge, Opts, Registry, TextEncoder};

lazy_static! {
    /// Global Prometheus registry.
    pub static ref REGISTRY: Registry = Registry::new();

    pub static ref ACTIVE_CONNECTIONS: IntGauge = IntGauge::with_opts(
        Opts::new("diameter_active_connections", "Open Diameter connections")
    ).unwrap();

    pub static ref MESSAGES_IN: Counter = Counter::with_opts(
        Opts::new("diameter_messages_in_total", "Messages received")
    ).unwrap();

    pub static ref MESSAGES_OUT: Counter = Counter::with_opts(
        Opts::new("diameter_messages_out_total", "Messages sent")
    ).unwrap();

    pub static ref DECODE_ERRORS: Counter = Counter::with_opts(
        Opts::new("diameter_decode_errors_total", "Frames that failed to decode")
    ).unwrap();

    pub static ref HANDSHAKE_FAILURES: Counter = Counter::with_opts(
        Opts::new("diameter_handshake_failures_total", "Rejected capabilities exchanges")
    ).unwrap();

    pub static ref RETRANSMITS: Counter = Counter::with_opts(
        Opts::new("diameter_retransmits_total", "Request retransmissions")
    ).unwrap();

    pub static ref WATCHDOG_FAILURES: Counter = Counter::with_opts(
        Opts::new("diameter_watchdog_failures_total", "Watchdogs that exhausted retries")
    ).unwrap();
}

/// Register all metrics with the global registry.
pub fn register_metrics() {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(ACTIVE_CONNECTIONS.clone()),
        Box::new(MESSAGES_IN.clone()),
        Box::new(MESSAGES_OUT.clone()),
        Box::new(DECODE_ERRORS.clone()),
        Box::new(HANDSHAKE_FAILURES.clone()),
        Box::new(RETRANSMITS.clone()),
        Box::new(WATCHDOG_FAILURES.clone()),
    ];
    for c in collectors {
        let _ = REGISTRY.register(c);
    }
}

/// Gather metrics in Prometheus text format.
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    encoder.encode(&metric_families, &mut buffer).unwrap();
    String::from_utf8(buffer).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();

        ACTIVE_CONNECTIONS.set(2);
        MESSAGES_IN.inc();
        MESSAGES_OUT.inc();
        RETRANSMITS.inc();

        let metrics = gather_metrics();
        assert!(metrics.contains("diameter_active_connections"));
        assert!(metrics.contains("diameter_messages_in_total"));
    }
}

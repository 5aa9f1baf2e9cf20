//! Prometheus metrics for the front-end server

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};

/// Global metrics instance
pub struct Metrics {
    pub registry: Registry,

    // Command counters
    pub cmd_get: IntCounter,
    pub cmd_set: IntCounter,
    pub cmd_delete: IntCounter,

    // Hit/miss counters
    pub get_hits: IntCounter,
    pub get_misses: IntCounter,

    // Connection metrics
    pub active_connections: IntGauge,
    pub total_connections: IntCounter,
    pub rejected_connections: IntCounter,

    // Bytes counters
    pub bytes_read: IntCounter,
    pub bytes_written: IntCounter,

    // Latency histograms
    pub cmd_latency: Histogram,

    // Error counters
    pub protocol_errors: IntCounter,
    pub unknown_errors: IntCounter,
    pub internal_errors: IntCounter,
    pub recovered_panics: IntCounter,
}

impl Metrics {
    /// Create and register all metrics
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let counter = |name: &str, help: &str| -> Result<IntCounter, prometheus::Error> {
            let counter = IntCounter::new(name, help)?;
            registry.register(Box::new(counter.clone()))?;
            Ok(counter)
        };

        let cmd_get = counter("kvgate_cmd_get_total", "Total GET commands")?;
        let cmd_set = counter("kvgate_cmd_set_total", "Total SET commands")?;
        let cmd_delete = counter("kvgate_cmd_delete_total", "Total DELETE commands")?;

        let get_hits = counter("kvgate_get_hits_total", "Total GET hits")?;
        let get_misses = counter("kvgate_get_misses_total", "Total GET misses")?;

        let total_connections = counter("kvgate_connections_total", "Total connections accepted")?;
        let rejected_connections = counter(
            "kvgate_rejected_connections_total",
            "Total connections rejected",
        )?;

        let bytes_read = counter("kvgate_bytes_read_total", "Total bytes read")?;
        let bytes_written = counter("kvgate_bytes_written_total", "Total bytes written")?;

        let protocol_errors = counter("kvgate_protocol_errors_total", "Total protocol errors")?;
        let unknown_errors = counter(
            "kvgate_unknown_errors_total",
            "Requests failed with an unrecognized backend response",
        )?;
        let internal_errors = counter(
            "kvgate_internal_errors_total",
            "Requests failed with an internal error",
        )?;
        let recovered_panics = counter(
            "kvgate_recovered_panics_total",
            "Request handler panics converted into errors",
        )?;

        let active_connections =
            IntGauge::new("kvgate_active_connections", "Current active connections")?;
        registry.register(Box::new(active_connections.clone()))?;

        let cmd_latency = Histogram::with_opts(
            HistogramOpts::new("kvgate_cmd_latency_seconds", "Command latency in seconds")
                .buckets(vec![
                    0.0001, 0.0005, 0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
                ]),
        )?;
        registry.register(Box::new(cmd_latency.clone()))?;

        Ok(Self {
            registry,
            cmd_get,
            cmd_set,
            cmd_delete,
            get_hits,
            get_misses,
            active_connections,
            total_connections,
            rejected_connections,
            bytes_read,
            bytes_written,
            cmd_latency,
            protocol_errors,
            unknown_errors,
            internal_errors,
            recovered_panics,
        })
    }

    /// Get Prometheus formatted metrics
    pub fn gather(&self) -> Result<String, prometheus::Error> {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

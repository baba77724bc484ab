//! Prometheus text exposition, grounded in
//! `Plawn-r2e/r2e-prometheus/src/handler.rs`'s `metrics_handler` shape
//! (encode the registry, return it as `text/plain; version=0.0.4`).

use prometheus::{Encoder, HistogramVec, IntCounterVec, Registry, TextEncoder};

pub struct Metrics {
    registry: Registry,
    requests_total: IntCounterVec,
    request_duration_ms: HistogramVec,
}

impl Metrics {
    pub fn new() -> Metrics {
        let registry = Registry::new();
        let requests_total = IntCounterVec::new(
            prometheus::Opts::new("sqlgate_requests_total", "Total workflow invocations"),
            &["workflow", "status"],
        )
        .expect("valid metric");
        let request_duration_ms = HistogramVec::new(
            prometheus::HistogramOpts::new("sqlgate_request_duration_ms", "Workflow invocation duration in milliseconds")
                .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 5000.0]),
            &["workflow"],
        )
        .expect("valid metric");

        registry.register(Box::new(requests_total.clone())).expect("register counter");
        registry.register(Box::new(request_duration_ms.clone())).expect("register histogram");

        Metrics { registry, requests_total, request_duration_ms }
    }

    pub fn record(&self, workflow: &str, status: u16, duration_ms: u64) {
        self.requests_total.with_label_values(&[workflow, &status.to_string()]).inc();
        self.request_duration_ms.with_label_values(&[workflow]).observe(duration_ms as f64);
    }

    pub fn encode_text(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buf = Vec::new();
        encoder.encode(&metric_families, &mut buf).unwrap_or_default();
        String::from_utf8(buf).unwrap_or_default()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

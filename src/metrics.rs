// src/metrics.rs
use axum::{routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder. Call once at startup, before any
    /// pipeline counters are touched.
    pub fn init() -> Self {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .expect("prometheus: install recorder");
        Self { handle }
    }

    /// Router exposing `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

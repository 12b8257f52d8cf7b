use std::net::SocketAddr;

/// Installs the Prometheus exporter when PLAYSCANNER_METRICS_PORT is usable.
/// Collection and search counters are emitted whether or not the exporter
/// is listening, so this is safe to call more than once.
pub fn init_metrics() {
    let port: u16 = std::env::var("PLAYSCANNER_METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9897);
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let builder = metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(addr);
    match builder.install() {
        Ok(()) => {
            tracing::info!("Prometheus exporter listening on http://{}/metrics", addr);
        }
        Err(e) => {
            tracing::warn!("Prometheus exporter install failed (possibly already installed): {}", e);
        }
    }
}

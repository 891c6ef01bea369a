//! Prometheus metrics for proxied traffic

use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Collectors shared by every handler a factory builds
#[derive(Clone)]
pub struct ProxyMetrics {
    /// Requests received, by endpoint kind
    pub requests_total: CounterVec,
    /// Requests refused by resource-level authorization, by resource type
    pub authorization_denied_total: CounterVec,
    /// Dial, protocol and timeout failures, by endpoint kind
    pub upstream_errors_total: CounterVec,
    /// Elements removed from list responses, by resource type
    pub filtered_resources_total: CounterVec,
    /// Time from dispatch to upstream response headers
    pub upstream_duration_seconds: HistogramVec,
    registry: Arc<Registry>,
}

impl ProxyMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_total = CounterVec::new(
            Opts::new("gateway_requests_total", "Total proxied requests"),
            &["endpoint_kind"],
        )?;

        let authorization_denied_total = CounterVec::new(
            Opts::new(
                "gateway_authorization_denied_total",
                "Requests denied by resource access control",
            ),
            &["resource_type"],
        )?;

        let upstream_errors_total = CounterVec::new(
            Opts::new("gateway_upstream_errors_total", "Failed upstream exchanges"),
            &["endpoint_kind"],
        )?;

        let filtered_resources_total = CounterVec::new(
            Opts::new(
                "gateway_filtered_resources_total",
                "Resources removed from list responses",
            ),
            &["resource_type"],
        )?;

        let upstream_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "gateway_upstream_duration_seconds",
                "Upstream response latency in seconds",
            ),
            &["endpoint_kind"],
        )?;

        registry.register(Box::new(requests_total.clone()))?;
        registry.register(Box::new(authorization_denied_total.clone()))?;
        registry.register(Box::new(upstream_errors_total.clone()))?;
        registry.register(Box::new(filtered_resources_total.clone()))?;
        registry.register(Box::new(upstream_duration_seconds.clone()))?;

        Ok(Self {
            requests_total,
            authorization_denied_total,
            upstream_errors_total,
            filtered_resources_total,
            upstream_duration_seconds,
            registry,
        })
    }

    pub fn record_request(&self, endpoint_kind: &str) {
        self.requests_total.with_label_values(&[endpoint_kind]).inc();
    }

    pub fn record_denied(&self, resource_type: &str) {
        self.authorization_denied_total.with_label_values(&[resource_type]).inc();
    }

    pub fn record_upstream_error(&self, endpoint_kind: &str) {
        self.upstream_errors_total.with_label_values(&[endpoint_kind]).inc();
    }

    pub fn record_filtered(&self, resource_type: &str, removed: usize) {
        if removed > 0 {
            self.filtered_resources_total
                .with_label_values(&[resource_type])
                .inc_by(removed as f64);
        }
    }

    pub fn observe_upstream(&self, endpoint_kind: &str, elapsed: Duration) {
        self.upstream_duration_seconds
            .with_label_values(&[endpoint_kind])
            .observe(elapsed.as_secs_f64());
    }

    /// Gather all metrics in Prometheus text format
    pub fn gather(&self) -> prometheus::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = vec![];
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_text_format() {
        let metrics = ProxyMetrics::new().expect("Failed to create metrics");
        metrics.record_request("docker");
        metrics.record_denied("container");
        metrics.record_upstream_error("azure");
        metrics.observe_upstream("docker", Duration::from_millis(12));

        let text = metrics.gather().expect("Failed to gather metrics");
        assert!(text.contains("# HELP"));
        assert!(text.contains("# TYPE"));
        assert!(text.contains("gateway_requests_total{endpoint_kind=\"docker\"} 1"));
        assert!(text.contains("gateway_authorization_denied_total{resource_type=\"container\"} 1"));
        assert!(text.contains("gateway_upstream_errors_total{endpoint_kind=\"azure\"} 1"));
        assert!(text.contains("gateway_upstream_duration_seconds_count{endpoint_kind=\"docker\"} 1"));
    }

    #[test]
    fn test_clones_share_collectors() {
        let metrics = ProxyMetrics::new().expect("Failed to create metrics");
        let clone = metrics.clone();
        clone.record_filtered("volume", 3);
        clone.record_filtered("volume", 0);

        let text = metrics.gather().expect("Failed to gather metrics");
        assert!(text.contains("gateway_filtered_resources_total{resource_type=\"volume\"} 3"));
    }

    #[test]
    fn test_content_type() {
        let metrics = ProxyMetrics::new().expect("Failed to create metrics");
        assert!(metrics.content_type().starts_with("text/plain"));
    }
}

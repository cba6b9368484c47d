//! # Prometheus Metrics
//!
//! Exposes operational metrics for the registry node. Scraped by Prometheus
//! at the `/metrics` HTTP endpoint on the configured metrics port.
//!
//! All metrics are registered in a dedicated [`prometheus::Registry`] so they
//! do not collide with any default global registry consumers.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use parcel_contracts::PropertyMarket;

/// Holds all Prometheus metric handles for the node.
///
/// Clone-friendly (prometheus handles are `Arc`s internally) so it can be
/// shared across request handlers.
#[derive(Clone)]
pub struct NodeMetrics {
    /// Prometheus registry that owns all metrics below.
    registry: Registry,
    /// Total number of properties successfully listed.
    pub properties_listed_total: IntCounter,
    /// Rejected registry calls, labelled by operation and error kind.
    pub rejections_total: IntCounterVec,
    /// Current length of the payment-method ledger. Refreshed on scrape.
    pub payment_methods: IntGauge,
    /// Most recently assigned property id. Refreshed on scrape.
    pub current_property_id: IntGauge,
    /// JSON-RPC calls received, labelled by method.
    pub rpc_requests_total: IntCounterVec,
    /// Time spent inside `list_property`, including the durable write.
    pub listing_latency_seconds: Histogram,
}

impl NodeMetrics {
    /// Creates and registers all metrics. Call once at startup.
    pub fn new() -> Self {
        let registry = Registry::new_custom(Some("parcel".into()), None)
            .expect("failed to create prometheus registry");

        let properties_listed_total = IntCounter::new(
            "properties_listed_total",
            "Total number of properties successfully listed",
        )
        .expect("metric creation");
        registry
            .register(Box::new(properties_listed_total.clone()))
            .expect("metric registration");

        let rejections_total = IntCounterVec::new(
            Opts::new(
                "rejections_total",
                "Rejected registry calls by operation and error kind",
            ),
            &["operation", "kind"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rejections_total.clone()))
            .expect("metric registration");

        let payment_methods =
            IntGauge::new("payment_methods", "Number of approved payment methods")
                .expect("metric creation");
        registry
            .register(Box::new(payment_methods.clone()))
            .expect("metric registration");

        let current_property_id = IntGauge::new(
            "current_property_id",
            "Most recently assigned property id (0 if none)",
        )
        .expect("metric creation");
        registry
            .register(Box::new(current_property_id.clone()))
            .expect("metric registration");

        let rpc_requests_total = IntCounterVec::new(
            Opts::new("rpc_requests_total", "JSON-RPC requests by method"),
            &["method"],
        )
        .expect("metric creation");
        registry
            .register(Box::new(rpc_requests_total.clone()))
            .expect("metric registration");

        let listing_latency_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "listing_latency_seconds",
                "Latency of property listings in seconds",
            )
            .buckets(vec![
                0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
            ]),
        )
        .expect("metric creation");
        registry
            .register(Box::new(listing_latency_seconds.clone()))
            .expect("metric registration");

        Self {
            registry,
            properties_listed_total,
            rejections_total,
            payment_methods,
            current_property_id,
            rpc_requests_total,
            listing_latency_seconds,
        }
    }

    /// Records a failed registry call.
    pub fn record_rejection(&self, operation: &str, kind: &str) {
        self.rejections_total
            .with_label_values(&[operation, kind])
            .inc();
    }

    /// Copies the ledger length and current property id out of `market`.
    ///
    /// Both values only grow and are read under the market's own locks, so
    /// a scrape never reports less than what was committed before it.
    pub fn observe_market(&self, market: &PropertyMarket) {
        self.payment_methods
            .set(market.payment_method_count() as i64);
        self.current_property_id
            .set(market.current_property_id() as i64);
    }

    /// Encodes all registered metrics into the Prometheus text exposition format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer).expect("prometheus output is valid utf-8"))
    }
}

impl Default for NodeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared metrics state passed to axum handlers.
pub type SharedMetrics = Arc<NodeMetrics>;

/// State behind the `/metrics` router.
#[derive(Clone)]
pub struct MetricsState {
    pub metrics: SharedMetrics,
    pub market: Arc<PropertyMarket>,
}

/// Axum handler that renders `/metrics` in Prometheus text format.
///
/// Registry gauges are refreshed from the market first. Returns HTTP 500 if
/// encoding fails.
pub async fn metrics_handler(
    axum::extract::State(state): axum::extract::State<MetricsState>,
) -> impl IntoResponse {
    state.metrics.observe_market(&state.market);
    match state.metrics.encode() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding failed").into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_includes_prefixed_names() {
        let metrics = NodeMetrics::new();
        metrics.properties_listed_total.inc();
        metrics.record_rejection("list_property", "invalid_input");
        metrics.rpc_requests_total.with_label_values(&["parcel_version"]).inc();

        let text = metrics.encode().unwrap();
        assert!(text.contains("parcel_properties_listed_total 1"));
        assert!(text.contains("parcel_rejections_total"));
        assert!(text.contains("kind=\"invalid_input\""));
    }

    #[test]
    fn gauges_follow_the_market() {
        let metrics = NodeMetrics::new();
        let market = PropertyMarket::new();
        market
            .add_payment_methods(vec!["0xA1".into(), "0xB2".into()])
            .unwrap();
        for symbol in ["TV69", "TV70", "TV71"] {
            market
                .list_property(parcel_contracts::PropertyListing {
                    registration_number: 69,
                    registration_code: "AQR696969HEY".into(),
                    name: "The 69 View".into(),
                    symbol: symbol.into(),
                    metadata_uri: "ipfs://...".into(),
                    owner: "0xOwner".into(),
                    verified: true,
                })
                .unwrap();
        }

        // A stale write from a slower request must not stick.
        metrics.current_property_id.set(1);
        metrics.observe_market(&market);

        let text = metrics.encode().unwrap();
        assert!(text.contains("parcel_current_property_id 3"));
        assert!(text.contains("parcel_payment_methods 2"));
    }
}

//! Metrics and tracing setup for meshkv.
//!
//! Provides a global [`NodeMetrics`] singleton backed by the `prometheus`
//! crate, plus an optional lightweight HTTP server for Prometheus scraping.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use std::sync::OnceLock;

// ────────────────────────── Tracing ──────────────────────────

/// Initialize the tracing subscriber with env-filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();
}

// ────────────────────────── Prometheus metrics ──────────────────────────

/// Global metrics instance.
static METRICS: OnceLock<NodeMetrics> = OnceLock::new();

/// Retrieve (or lazily create) the global metrics singleton.
pub fn metrics() -> &'static NodeMetrics {
    METRICS.get_or_init(NodeMetrics::new)
}

/// All Prometheus metrics for a meshkv node.
pub struct NodeMetrics {
    pub registry: Registry,

    // ── Request counters ──
    pub requests_served: IntCounterVec,
    pub requests_forwarded: IntCounterVec,
    pub requests_failed: IntCounter,

    // ── Round-trip latency ──
    pub round_trip_secs: HistogramVec,

    // ── Shard ──
    pub records_stored: IntGauge,
    pub keys_expired: IntCounter,
}

// Manual Debug impl because prometheus types don't derive Debug.
impl std::fmt::Debug for NodeMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeMetrics").finish_non_exhaustive()
    }
}

/// Default histogram buckets (seconds) for round-trip latency.
const LATENCY_BUCKETS: &[f64] = &[0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0];

impl NodeMetrics {
    fn new() -> Self {
        let registry = Registry::new();

        let requests_served = IntCounterVec::new(
            Opts::new(
                "meshkv_requests_served_total",
                "Requests executed against the local shard, by action",
            ),
            &["action"],
        )
        .expect("requests_served counter vec");

        let requests_forwarded = IntCounterVec::new(
            Opts::new(
                "meshkv_requests_forwarded_total",
                "Requests forwarded to an owning peer, by action",
            ),
            &["action"],
        )
        .expect("requests_forwarded counter vec");

        let requests_failed = IntCounter::with_opts(Opts::new(
            "meshkv_requests_failed_total",
            "Requests that produced an error response",
        ))
        .expect("requests_failed counter");

        let round_trip_secs = HistogramVec::new(
            HistogramOpts::new(
                "meshkv_round_trip_seconds",
                "Peer round-trip latency in seconds",
            )
            .buckets(LATENCY_BUCKETS.to_vec()),
            &["action"],
        )
        .expect("round_trip_secs histogram");

        let records_stored = IntGauge::with_opts(Opts::new(
            "meshkv_records_stored",
            "Records currently held by the local shard",
        ))
        .expect("records_stored gauge");

        let keys_expired = IntCounter::with_opts(Opts::new(
            "meshkv_keys_expired_total",
            "Keys removed by TTL expiry",
        ))
        .expect("keys_expired counter");

        // Register all metrics
        registry
            .register(Box::new(requests_served.clone()))
            .expect("register requests_served");
        registry
            .register(Box::new(requests_forwarded.clone()))
            .expect("register requests_forwarded");
        registry
            .register(Box::new(requests_failed.clone()))
            .expect("register requests_failed");
        registry
            .register(Box::new(round_trip_secs.clone()))
            .expect("register round_trip_secs");
        registry
            .register(Box::new(records_stored.clone()))
            .expect("register records_stored");
        registry
            .register(Box::new(keys_expired.clone()))
            .expect("register keys_expired");

        Self {
            registry,
            requests_served,
            requests_forwarded,
            requests_failed,
            round_trip_secs,
            records_stored,
            keys_expired,
        }
    }
}

/// Encode all registered metrics in Prometheus text exposition format.
pub fn encode_metrics() -> String {
    let m = metrics();
    let encoder = TextEncoder::new();
    let mut buf = Vec::new();
    encoder
        .encode(&m.registry.gather(), &mut buf)
        .expect("prometheus text encoding");
    String::from_utf8(buf).expect("prometheus output is valid UTF-8")
}

/// Helper: start a round-trip latency timer. Returns a guard that
/// records elapsed time on drop.
pub fn start_round_trip_timer(action: &str) -> prometheus::HistogramTimer {
    metrics()
        .round_trip_secs
        .with_label_values(&[action])
        .start_timer()
}

// ────────────────────────── Metrics HTTP server ──────────────────────────

use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

async fn metrics_handler(
    _req: Request<hyper::body::Incoming>,
) -> Result<Response<Full<Bytes>>, std::convert::Infallible> {
    let body = encode_metrics();
    Ok(Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; version=0.0.4; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .expect("valid HTTP response"))
}

/// Serve Prometheus metrics on the given address (`GET /metrics`).
///
/// This spawns a lightweight HTTP/1.1 server. Call from a `tokio::spawn`.
pub async fn serve_metrics(
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!("metrics server listening on http://{}/metrics", addr);

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(metrics_handler))
                .await
            {
                tracing::debug!("metrics connection error: {}", e);
            }
        });
    }
}

// ────────────────────────── Tests ──────────────────────────

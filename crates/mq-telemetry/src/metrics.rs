//! Prometheus metrics for Quantum-MQ.
//!
//! All metrics follow the naming convention: `mq_<area>_<metric>_<unit>`
//!
//! ## Metric Types
//!
//! - **Counter**: Monotonically increasing value (e.g., frames_sent_total)
//! - **Gauge**: Value that can go up or down (e.g., service_queue_depth)
//! - **Histogram**: Distribution of values (e.g., request_duration_seconds)
//!
//! Metrics update whether or not [`register_metrics`] was called; registering
//! only exposes them through [`gather_text`].

use lazy_static::lazy_static;
use prometheus::{
    exponential_buckets, Counter, CounterVec, Encoder, Gauge, Histogram, Opts, Registry,
    TextEncoder,
};
use std::sync::Arc;

use crate::TelemetryError;

lazy_static! {
    /// Global metrics registry
    pub static ref REGISTRY: Registry = Registry::new();

    // =========================================================================
    // CONNECTION METRICS
    // =========================================================================

    /// Connections that completed the greeting, by local role
    pub static ref CONNECTIONS_ESTABLISHED: CounterVec = CounterVec::new(
        Opts::new("mq_connections_established_total", "Connections that completed the greeting"),
        &["role"]
    ).expect("metric creation failed");

    /// Live connections closed, by local role
    pub static ref CONNECTIONS_CLOSED: CounterVec = CounterVec::new(
        Opts::new("mq_connections_closed_total", "Live connections closed"),
        &["role"]
    ).expect("metric creation failed");

    /// Greeting outcomes
    pub static ref HANDSHAKES: CounterVec = CounterVec::new(
        Opts::new("mq_handshakes_total", "Greeting negotiations by outcome"),
        &["outcome"]  // outcome: verified/rejected/timeout/transport_error
    ).expect("metric creation failed");

    // =========================================================================
    // FRAME METRICS
    // =========================================================================

    /// Frames written to transports
    pub static ref FRAMES_SENT: Counter = Counter::new(
        "mq_frames_sent_total",
        "Total frames written to transports"
    ).expect("metric creation failed");

    /// Frames read from transports
    pub static ref FRAMES_RECEIVED: Counter = Counter::new(
        "mq_frames_received_total",
        "Total frames read from transports"
    ).expect("metric creation failed");

    /// Serialization failures by kind
    pub static ref SERIALIZATION_ERRORS: CounterVec = CounterVec::new(
        Opts::new("mq_serialization_errors_total", "Serialization failures"),
        &["kind"]  // kind: no_serializer/no_deserializer/malformed/failed
    ).expect("metric creation failed");

    // =========================================================================
    // PUB/SUB METRICS
    // =========================================================================

    /// Per-subscriber broadcast outcomes
    pub static ref BROADCAST_DELIVERIES: CounterVec = CounterVec::new(
        Opts::new("mq_broadcast_deliveries_total", "Per-subscriber broadcast deliveries"),
        &["outcome"]  // outcome: delivered/failed
    ).expect("metric creation failed");

    // =========================================================================
    // REQUEST/RESPONSE METRICS
    // =========================================================================

    /// Requester outcomes
    pub static ref REQUESTS: CounterVec = CounterVec::new(
        Opts::new("mq_requests_total", "Requests by outcome"),
        &["outcome"]  // outcome: ok/remote_error/queue_full/timeout/disconnected/error
    ).expect("metric creation failed");

    /// Round-trip request latency
    pub static ref REQUEST_DURATION: Histogram = Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "mq_request_duration_seconds",
            "Round-trip time of requests"
        ).buckets(exponential_buckets(0.0001, 2.0, 16).expect("valid buckets"))
    ).expect("metric creation failed");

    /// Handler invocations on the responding side
    pub static ref HANDLER_INVOCATIONS: CounterVec = CounterVec::new(
        Opts::new("mq_handler_invocations_total", "Request handler invocations"),
        &["outcome"]  // outcome: ok/error/unhandled/panic
    ).expect("metric creation failed");

    // =========================================================================
    // SERVICE QUEUE METRICS
    // =========================================================================

    /// Jobs waiting for a worker
    pub static ref SERVICE_QUEUE_DEPTH: Gauge = Gauge::new(
        "mq_service_queue_depth",
        "Requests waiting for a worker"
    ).expect("metric creation failed");

    /// Requests rejected because the queue stayed full
    pub static ref SERVICE_QUEUE_REJECTIONS: Counter = Counter::new(
        "mq_service_queue_rejections_total",
        "Requests rejected by a full service queue"
    ).expect("metric creation failed");
}

/// Handle to the registered metrics.
pub struct MetricsHandle {
    registry: Arc<Registry>,
}

impl MetricsHandle {
    /// Render all registered metrics in the text exposition format.
    pub fn gather_text(&self) -> Result<String, TelemetryError> {
        encode(&self.registry)
    }
}

/// Register all metrics with the global registry.
///
/// Safe to call more than once.
pub fn register_metrics() -> Result<MetricsHandle, TelemetryError> {
    let metrics: Vec<Box<dyn prometheus::core::Collector>> = vec![
        // Connections
        Box::new(CONNECTIONS_ESTABLISHED.clone()),
        Box::new(CONNECTIONS_CLOSED.clone()),
        Box::new(HANDSHAKES.clone()),
        // Frames
        Box::new(FRAMES_SENT.clone()),
        Box::new(FRAMES_RECEIVED.clone()),
        Box::new(SERIALIZATION_ERRORS.clone()),
        // Pub/sub
        Box::new(BROADCAST_DELIVERIES.clone()),
        // Request/response
        Box::new(REQUESTS.clone()),
        Box::new(REQUEST_DURATION.clone()),
        Box::new(HANDLER_INVOCATIONS.clone()),
        // Service queue
        Box::new(SERVICE_QUEUE_DEPTH.clone()),
        Box::new(SERVICE_QUEUE_REJECTIONS.clone()),
    ];

    for metric in metrics {
        match REGISTRY.register(metric) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(TelemetryError::MetricsInit(e.to_string())),
        }
    }

    Ok(MetricsHandle {
        registry: Arc::new(REGISTRY.clone()),
    })
}

/// Render the global registry in the text exposition format.
pub fn gather_text() -> Result<String, TelemetryError> {
    encode(&REGISTRY)
}

fn encode(registry: &Registry) -> Result<String, TelemetryError> {
    let mut buffer = Vec::new();
    TextEncoder::new()
        .encode(&registry.gather(), &mut buffer)
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| TelemetryError::MetricsInit(e.to_string()))
}

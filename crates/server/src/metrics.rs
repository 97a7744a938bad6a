//! Prometheus metrics for the harvest server.
//!
//! Exposes protocol request counts, protocol error codes, resumption token
//! lifecycle counters and request latency. Labels never carry identifiers or
//! token values.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Request metrics
pub static PROTOCOL_REQUESTS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvest_protocol_requests_total",
            "Total protocol requests by verb (\"invalid\" when the verb was rejected)",
        ),
        &["verb"],
    )
    .expect("metric creation failed")
});

pub static PROTOCOL_ERRORS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvest_protocol_errors_total",
            "Total protocol errors returned, by error code",
        ),
        &["code"],
    )
    .expect("metric creation failed")
});

pub static REQUEST_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "harvest_request_duration_seconds",
            "Time taken to handle a protocol request",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["verb"],
    )
    .expect("metric creation failed")
});

// Resumption token metrics
pub static TOKENS_MINTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "harvest_resumption_tokens_minted_total",
        "Total number of resumption tokens issued",
    )
    .expect("metric creation failed")
});

pub static TOKENS_REDEEMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "harvest_resumption_tokens_redeemed_total",
        "Total number of resumption tokens successfully redeemed",
    )
    .expect("metric creation failed")
});

pub static TOKENS_REJECTED: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "harvest_resumption_tokens_rejected_total",
            "Total resumption token redemptions rejected, by reason",
        ),
        &["reason"],
    )
    .expect("metric creation failed")
});

pub static TOKENS_PRUNED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "harvest_resumption_tokens_pruned_total",
        "Total number of expired resumption tokens removed by sweeps",
    )
    .expect("metric creation failed")
});

static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Safe to call more than once; registration happens on the first call.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        REGISTRY
            .register(Box::new(PROTOCOL_REQUESTS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(PROTOCOL_ERRORS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(REQUEST_DURATION.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKENS_MINTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKENS_REDEEMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKENS_REJECTED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(TOKENS_PRUNED.clone()))
            .expect("metric registration failed");
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

/// Record a rejected token redemption.
pub fn record_token_rejection(reason: &str) {
    TOKENS_REJECTED.with_label_values(&[reason]).inc();
}

pub mod middleware;
pub mod registry;

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use prometheus::{Encoder, TextEncoder};

use crate::response::Envelope;

/// Prometheus exposition of the default registry
pub async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return Envelope::internal_server_error().into_response();
    }

    match String::from_utf8(buffer) {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, encoder.format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => {
            tracing::error!("Metrics output is not UTF-8: {}", e);
            Envelope::internal_server_error().into_response()
        }
    }
}

// Re-export commonly used metrics for convenience
pub use registry::{
    ERRORS_REDACTED_TOTAL, ERRORS_TRANSLATED_TOTAL, FATAL_TRIGGERS_TOTAL, HTTP_REQUESTS_TOTAL,
    HTTP_REQUEST_DURATION_SECONDS,
};

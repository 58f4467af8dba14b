use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::disclosure::RequestMeta;

/// Query parameters whose values never reach the log
const SENSITIVE_PARAMS: [&str; 4] = ["api_key", "token", "password", "secret"];

/// Middleware to log all HTTP requests and responses with structured data
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4().to_string();
    let meta = RequestMeta::from_request(&request);
    let path = request.uri().path().to_string();
    let query = redact_query(request.uri().query().unwrap_or(""));

    info!(
        request_id = %request_id,
        method = %meta.method,
        path = %path,
        query = %query,
        ip = meta.ip.as_deref().unwrap_or("unknown"),
        "Incoming request"
    );

    let response = next.run(request).await;

    let duration_ms = start.elapsed().as_millis();
    let status = response.status();

    if status.is_server_error() {
        error!(
            request_id = %request_id,
            method = %meta.method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            "Request failed (server error)"
        );
    } else if status.is_client_error() {
        warn!(
            request_id = %request_id,
            method = %meta.method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            "Request failed (client error)"
        );
    } else {
        info!(
            request_id = %request_id,
            method = %meta.method,
            path = %path,
            status = status.as_u16(),
            duration_ms = %duration_ms,
            "Request completed"
        );
    }

    response
}

/// Replace the value of every sensitive parameter with `***`
fn redact_query(query: &str) -> String {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((key, _)) if SENSITIVE_PARAMS.contains(&key) => format!("{}=***", key),
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&")
}

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, error};

use crate::disclosure::{Renderer, RequestMeta};
use crate::errors::{ErrorTranslator, RawError};
use crate::metrics::{ERRORS_REDACTED_TOTAL, ERRORS_TRANSLATED_TOTAL};
use crate::response::Envelope;

/// Error type returned by handlers.
///
/// Converting it into a response only parks the raw error in the response
/// extensions; [`error_handler`] turns it into an envelope. Without that
/// middleware the client sees a bare 500.
#[derive(Debug)]
pub struct AppError(pub RawError);

impl<E> From<E> for AppError
where
    E: Into<RawError>,
{
    fn from(error: E) -> Self {
        Self(error.into())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
        response.extensions_mut().insert(self.0);
        response
    }
}

/// Translation and rendering, configured once at startup
#[derive(Debug, Clone)]
pub struct ErrorHandler {
    translator: ErrorTranslator,
    renderer: Renderer,
}

impl ErrorHandler {
    pub fn new(translator: ErrorTranslator, renderer: Renderer) -> Self {
        Self {
            translator,
            renderer,
        }
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }

    /// Turn a raw handler error into the envelope sent to the client
    pub fn handle(&self, raw: RawError, meta: &RequestMeta) -> Envelope {
        let category = ErrorTranslator::categorize(&raw);
        let exception = self.translator.translate(raw);

        debug!(
            category = %category,
            kind = %exception.kind,
            status = exception.status_code,
            public = exception.is_public,
            "Translated handler error"
        );
        ERRORS_TRANSLATED_TOTAL
            .with_label_values(&[&exception.kind, &exception.status_code.to_string()])
            .inc();

        if self.renderer.redacts(&exception) {
            // The client only gets a generic 500, keep the detail server-side
            error!(
                method = %meta.method,
                path = %meta.path,
                kind = %exception.kind,
                status = exception.status_code,
                code = exception.code.as_deref().unwrap_or(""),
                "Internal error occurred: {}",
                exception
            );
            ERRORS_REDACTED_TOTAL.inc();
        }

        self.renderer.render(exception, meta)
    }
}

/// Middleware rendering every [`AppError`] produced further down the stack
pub async fn error_handler(
    State(handler): State<Arc<ErrorHandler>>,
    request: Request,
    next: Next,
) -> Response {
    let meta = RequestMeta::from_request(&request);
    let mut response = next.run(request).await;

    match response.extensions_mut().remove::<RawError>() {
        Some(raw) => handler.handle(raw, &meta).into_response(),
        None => response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disclosure::DisclosureMode;
    use crate::errors::{CastError, Exception, OpaqueError};
    use serde_json::json;

    fn handler(mode: DisclosureMode) -> ErrorHandler {
        ErrorHandler::new(ErrorTranslator::default(), Renderer::new(mode))
    }

    #[test]
    fn test_app_error_parks_raw_error() {
        let response = AppError::from(Exception::new("nope", 403)).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.extensions().get::<RawError>().is_some());
    }

    #[test]
    fn test_anyhow_converts_to_opaque() {
        let AppError(raw) = AppError::from(anyhow::anyhow!("disk full"));
        assert!(matches!(raw, RawError::Opaque(OpaqueError { ref message, .. }) if message == "disk full"));
    }

    #[test]
    fn test_handle_public_in_production() {
        let envelope = handler(DisclosureMode::Production).handle(
            RawError::Cast(CastError {
                path: "id".to_string(),
                value: "abc".to_string(),
            }),
            &RequestMeta::default(),
        );
        assert_eq!(envelope.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            envelope.body().unwrap(),
            json!({"success": false, "error": "Invalid id: abc."})
        );
    }

    #[test]
    fn test_handle_opaque_in_production() {
        let envelope = handler(DisclosureMode::Production).handle(
            RawError::Opaque(OpaqueError::new("secret internals").with_status(502)),
            &RequestMeta::default(),
        );
        assert_eq!(envelope.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            envelope.body().unwrap(),
            json!({"success": false, "error": "Internal Server Error"})
        );
    }
}

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use error_contract::api::handlers::AppStateInner;
use error_contract::api::middleware::ErrorHandler;
use error_contract::api::routes::create_router;
use error_contract::config::Config;
use error_contract::disclosure::{Renderer, TracingNotifier};
use error_contract::errors::ErrorTranslator;
use error_contract::guardian::ProcessGuardian;
use error_contract::metrics;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,error_contract=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting error-contract v{}", env!("CARGO_PKG_VERSION"));

    // Initialize metrics
    metrics::registry::init_metrics();
    info!("Metrics registry initialized");

    // Load configuration
    let config = Config::from_env().context("Failed to load configuration")?;
    info!(mode = %config.errors.mode, "Configuration loaded successfully");

    // Fatal-path hooks are registered here and nowhere else
    let guardian =
        ProcessGuardian::install(config.guardian()).context("Failed to install process guardian")?;

    let mut renderer =
        Renderer::new(config.errors.mode).with_console(config.errors.show_error_console);
    if config.errors.show_error_notify {
        renderer = renderer.with_notifier(Arc::new(TracingNotifier));
    }
    let errors = Arc::new(ErrorHandler::new(
        ErrorTranslator::new(config.translator_policy()),
        renderer,
    ));

    let state = Arc::new(AppStateInner {
        mode: config.errors.mode,
        started_at: Instant::now(),
    });

    let app = create_router(state, errors);

    // Start server
    let addr = config.server_address();
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("Failed to bind server")?;
    guardian.attach_listener();

    info!("Server listening on {}", addr);

    // Serve with graceful shutdown
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(guardian.shutdown_signal())
    .await
    .context("Server error")?;

    guardian.finish();

    Ok(())
}

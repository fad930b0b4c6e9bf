use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::response::IntoResponse;
use tokio::net::TcpListener;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

mod config;
mod error;
mod handler;
mod image;
mod ollama;
mod salvage;

use config::{ErrorConfig, LogDestination};
use error::{ErrorReporter, GatewayError};
use ollama::OllamaClient;

/// Room for two maximum-size images plus multipart framing; per-image
/// limits are enforced by the validator.
const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

/// Read-only per-request context. Cloning is cheap; the reqwest client
/// carries its own shared connection pool.
#[derive(Clone)]
pub struct AppState {
    pub config_path: Arc<PathBuf>,
    pub reporter: Arc<ErrorReporter>,
    pub client: OllamaClient,
}

fn init_logging(config: &ErrorConfig) -> anyhow::Result<()> {
    if !config.log_errors {
        return Ok(());
    }

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_lowercase()));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match config.log_destination {
        LogDestination::Console => builder.init(),
        LogDestination::File => {
            let file = open_log_file(&config.log_file_path)?;
            builder.with_writer(Arc::new(file)).with_ansi(false).init();
        }
        LogDestination::Both => {
            let file = open_log_file(&config.log_file_path)?;
            builder
                .with_writer(std::io::stdout.and(Arc::new(file)))
                .with_ansi(false)
                .init();
        }
    }
    Ok(())
}

/// A panic anywhere in a handler or layer still owes the client the
/// JSON envelope; this feeds `CatchPanicLayer::custom`.
fn panic_handler(
    reporter: Arc<ErrorReporter>,
) -> impl Fn(Box<dyn std::any::Any + Send + 'static>) -> axum::response::Response
+ Clone
+ Send
+ Sync
+ 'static {
    move |err| {
        let details = if let Some(s) = err.downcast_ref::<String>() {
            s.clone()
        } else if let Some(s) = err.downcast_ref::<&str>() {
            (*s).to_string()
        } else {
            "handler panicked".to_string()
        };
        reporter
            .respond(GatewayError::Internal { details })
            .into_response()
    }
}

fn open_log_file(path: &str) -> anyhow::Result<std::fs::File> {
    if let Some(dir) = Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
        }
    }
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening log file {path}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let error_config_path =
        std::env::var("ERROR_CONFIG_PATH").unwrap_or_else(|_| "error_config.json".to_string());
    let error_config = match ErrorConfig::load(Path::new(&error_config_path)) {
        Ok(config) => config,
        Err(e) => {
            // Logging is not up yet.
            eprintln!("cannot load {error_config_path} ({e}), using defaults");
            ErrorConfig::default()
        }
    };
    init_logging(&error_config)?;

    let config_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.json".to_string());
    let reporter = Arc::new(ErrorReporter::new(error_config));
    let state = AppState {
        config_path: Arc::new(PathBuf::from(config_path)),
        reporter: reporter.clone(),
        client: OllamaClient::new(),
    };

    let app = handler::routes()
        .layer(CatchPanicLayer::custom(panic_handler(reporter)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state);

    let addr = std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string());
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("vision gateway listening on {addr}");
    axum::serve(listener, app).await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use tower::ServiceExt;

    #[tokio::test]
    async fn panicking_handler_returns_internal_error_envelope() {
        let reporter = Arc::new(ErrorReporter::new(ErrorConfig::default()));
        async fn boom() {
            panic!("lost the plot");
        }
        let app = Router::new()
            .route("/boom", get(boom))
            .layer(CatchPanicLayer::custom(panic_handler(reporter)));

        let response = app
            .oneshot(Request::builder().uri("/boom").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "InternalError");
        assert!(!value["trace_id"].as_str().unwrap().is_empty());
    }
}

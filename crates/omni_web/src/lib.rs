use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;
use omni_core::{Result, ScreenParser};
use omni_parser::models::MockParser;

pub mod error_log;
pub mod handlers;
pub mod mock;
pub mod state;

pub use error_log::ErrorLog;
pub use state::SidecarState;

/// Real-local sidecar: cached readiness on `/probe`, model-backed `/parse`.
///
/// Screenshots arrive base64-encoded in the body, so no body size limit applies.
pub fn create_app(state: SidecarState) -> Router {
    Router::new()
        .route("/probe", get(handlers::probe).fallback(handlers::not_found))
        .route("/probe/", get(handlers::probe).fallback(handlers::not_found))
        .route("/parse", post(handlers::parse).fallback(handlers::not_found))
        .route("/parse/", post(handlers::parse).fallback(handlers::not_found))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Stateless contract double with canned answers.
pub fn create_mock_app() -> Router {
    let parser: Arc<dyn ScreenParser> = Arc::new(MockParser);
    Router::new()
        .route("/probe", get(mock::probe).fallback(handlers::not_found))
        .route("/probe/", get(mock::probe).fallback(handlers::not_found))
        .route("/parse", post(mock::parse).fallback(handlers::not_found))
        .route("/parse/", post(mock::parse).fallback(handlers::not_found))
        .fallback(handlers::not_found)
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(parser)
}

/// Serves until Ctrl-C.
pub async fn serve(app: Router, addr: &str) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutting down");
    }
}

pub mod prelude {
    pub use super::{create_app, create_mock_app, serve, ErrorLog, SidecarState};
    pub use omni_core::{Error, Result};
}

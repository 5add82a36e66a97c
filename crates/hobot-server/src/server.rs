//! Router assembly and server startup.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::routes;
use crate::state::AppState;

/// Build the axum router with all gateway routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .route("/chat", post(routes::chat))
        .route("/chat/stream", post(routes::chat_stream))
        .route("/confirm/{confirmation_id}", post(routes::confirm))
        .route(
            "/escalations/{escalation_id}/resolve",
            post(routes::resolve_escalation),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind and serve until the shutdown signal fires.
pub async fn serve(
    state: AppState,
    bind: &str,
    port: u16,
) -> std::io::Result<()> {
    let router = build_router(state);
    let listener = tokio::net::TcpListener::bind((bind, port)).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "hobot gateway listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                let _ = sig.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("shutdown signal received");
}

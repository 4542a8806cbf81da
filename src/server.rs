use crate::{
    config::HEALTH_PATH,
    error::AppError,
};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Router,
};
use color_eyre::Result;
use prometheus::{
    Encoder as _,
    Registry,
    TextEncoder,
};
use std::net::SocketAddr;
use tokio::net::TcpListener;

#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
}

pub fn create_router(registry: Registry, metrics_path: &str) -> Router {
    let state = AppState { registry };

    Router::new()
        .route(HEALTH_PATH, get(healthz))
        .route(metrics_path, get(metrics))
        .with_state(state)
}

pub async fn serve(listen: SocketAddr, router: Router) -> Result<()> {
    let listener = TcpListener::bind(listen).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received Ctrl-C, shutting down"),
        Err(err) => {
            error!("cannot listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    }
}

async fn healthz() -> &'static str {
    "ok"
}

/// The collectors do blocking I/O, so gathering runs off the async workers.
async fn metrics(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let registry = state.registry;
    let body = tokio::task::spawn_blocking(move || encode(&registry)).await??;
    Ok(([(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())], body))
}

fn encode(registry: &Registry) -> Result<String, AppError> {
    let families = registry.gather();
    let mut buffer = Vec::new();
    TextEncoder::new().encode(&families, &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

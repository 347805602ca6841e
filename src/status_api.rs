//! Read-only HTTP view of a monitoring session for dashboards
use std::net::SocketAddr;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use tokio::net::TcpListener;
use tracing::info;

use crate::background_services::{SessionSnapshot, SnapshotStore};

pub fn router(store: SnapshotStore) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .with_state(store)
}

#[tracing::instrument(err, skip(store))]
pub async fn serve(addr: SocketAddr, store: SnapshotStore) -> anyhow::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("serving trip status on {}", listener.local_addr()?);

    axum::serve(listener, router(store)).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn get_status(State(store): State<SnapshotStore>) -> Json<SessionSnapshot> {
    Json(store.read().await.clone())
}

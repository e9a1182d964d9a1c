//! HTTP surface exposed to browsers: the `/live` WebSocket for listening
//! in, and the `/status` snapshot polled by the control UI. The rest of
//! the control surface lives outside this crate.

mod ws;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::error::{NannyError, NannyResult};
use crate::live::LiveHub;
use crate::state::{StationState, StatusSnapshot};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<LiveHub>,
    pub state: Arc<StationState>,
}

/// Builds the router. Permissive CORS so browser pages served elsewhere
/// can reach the station.
pub fn router(app: AppState) -> Router {
    Router::new()
        .route("/live", get(ws::live_handler))
        .route("/status", get(status_handler))
        .layer(CorsLayer::permissive())
        .with_state(app)
}

async fn status_handler(State(app): State<AppState>) -> Json<StatusSnapshot> {
    Json(app.state.snapshot(app.hub.client_count()))
}

/// Serves the router until cancelled.
pub async fn serve(app: AppState, port: u16, cancel: CancellationToken) -> NannyResult<()> {
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port))
        .await
        .map_err(|e| NannyError::ConfigInvalid(format!("cannot bind web port {}: {}", port, e)))?;
    log::info!("[Web] Listening on port {}", port);
    axum::serve(listener, router(app))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| NannyError::FileIo(e.to_string()))
}

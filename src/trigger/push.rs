//! Push transport: the messaging substrate POSTs each trigger to `/`.
//!
//! The status code is the acknowledgment: 2xx stops redelivery, 5xx asks for
//! it, 4xx marks the message as one that redelivery will never fix.
//! `GET /healthz` answers 503 while the store is unreachable.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use super::{Disposition, decode_push, dispatch};
use crate::engine::ClaimEngine;
use crate::error::Result;

pub fn router(engine: Arc<ClaimEngine>) -> Router {
    Router::new()
        .route("/", post(receive))
        .route("/healthz", get(healthz))
        .layer(TraceLayer::new_for_http())
        .with_state(engine)
}

pub fn status_for(disposition: Disposition) -> StatusCode {
    match disposition {
        Disposition::Ack => StatusCode::NO_CONTENT,
        Disposition::Nack => StatusCode::INTERNAL_SERVER_ERROR,
        Disposition::Reject => StatusCode::BAD_REQUEST,
    }
}

async fn receive(State(engine): State<Arc<ClaimEngine>>, body: Bytes) -> StatusCode {
    status_for(dispatch(&engine, decode_push(&body)).await)
}

async fn healthz(State(engine): State<Arc<ClaimEngine>>) -> StatusCode {
    match engine.ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "health check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Serve push triggers on `listener` until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    engine: Arc<ClaimEngine>,
    shutdown: Arc<Notify>,
) -> Result<()> {
    info!(addr = ?listener.local_addr().ok(), "push trigger listening");
    axum::serve(listener, router(engine))
        .with_graceful_shutdown(async move { shutdown.notified().await })
        .await?;
    info!("push trigger stopped");
    Ok(())
}

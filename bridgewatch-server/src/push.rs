//! HTTP endpoint receiving pushed bridge states.

use std::sync::Arc;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::routing::post;
use bridgewatch_core::PushReceiver;
use tower_http::trace::TraceLayer;
use tracing::error;

pub type PushReceivers = Arc<[Arc<dyn PushReceiver>]>;

#[derive(Clone)]
struct PushState {
    receivers: PushReceivers,
}

/// `POST /` hands the raw body to every receiver and answers `ack`.
pub fn router(receivers: PushReceivers) -> Router {
    Router::new()
        .route("/", post(receive_push))
        .layer(TraceLayer::new_for_http())
        .with_state(PushState { receivers })
}

async fn receive_push(State(state): State<PushState>, body: Bytes) -> &'static str {
    for receiver in state.receivers.iter() {
        if let Err(e) = receiver.receive_push(&body).await {
            error!("Callback update failed: {:#}", e);
        }
    }
    "ack"
}

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::http::{chat, middleware, status};
use crate::state::AppState;

/// Build the service router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat::send_message))
        .route("/status", get(status::status))
        .layer(middleware::cors::build_cors_layer())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

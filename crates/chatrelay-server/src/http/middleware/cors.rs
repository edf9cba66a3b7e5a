use axum::http::{Method, header};
use tower_http::cors::{Any, CorsLayer};

/// Allow browser clients from any origin to reach the relay.
pub fn build_cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

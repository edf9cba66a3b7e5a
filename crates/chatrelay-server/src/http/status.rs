//! Service status endpoint

use axum::Json;
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct Status {
    status: String,
}

pub async fn status() -> Json<Status> {
    Json(Status {
        status: "OK".to_string(),
    })
}

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    pub backend: &'static str,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let backend = if state.pipeline.store().is_local() {
        "local"
    } else {
        "s3"
    };
    Json(HealthResponse { ok: true, backend })
}

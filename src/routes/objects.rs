use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::mime;
use crate::object_store_cleanup::{self, CleanupStats};
use crate::s3::ObjectInfo;
use crate::{error::ApiError, AppState};

#[derive(Deserialize)]
pub struct KeyQuery {
    pub key: String,
}

#[derive(Deserialize)]
pub struct CleanupQuery {
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Serialize)]
pub struct UrlResponse {
    pub url: String,
}

fn header_value(value: &str) -> HeaderValue {
    HeaderValue::from_str(value).unwrap_or_else(|_| HeaderValue::from_static(mime::OCTET_STREAM))
}

/// GET /objects?key=
pub async fn get_object(
    State(state): State<AppState>,
    Query(q): Query<KeyQuery>,
) -> Result<Response, ApiError> {
    let bytes = state.pipeline.download(&q.key).await?;
    let content_type = header_value(mime::guess(&q.key));
    Ok(([(header::CONTENT_TYPE, content_type)], bytes).into_response())
}

/// HEAD /objects?key=
pub async fn head_object(
    State(state): State<AppState>,
    Query(q): Query<KeyQuery>,
) -> Result<(StatusCode, HeaderMap), ApiError> {
    let info = state.pipeline.stat(&q.key).await?;
    let mut headers = HeaderMap::new();
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(info.size));
    let content_type = info
        .content_type
        .as_deref()
        .unwrap_or(mime::OCTET_STREAM);
    headers.insert(header::CONTENT_TYPE, header_value(content_type));
    if let Some(etag) = info.etag.as_ref() {
        if let Ok(value) = HeaderValue::from_str(&format!("\"{}\"", etag)) {
            headers.insert(header::ETAG, value);
        }
    }
    Ok((StatusCode::OK, headers))
}

/// GET /objects/stat?key=
pub async fn stat_object(
    State(state): State<AppState>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<ObjectInfo>, ApiError> {
    Ok(Json(state.pipeline.stat(&q.key).await?))
}

/// GET /objects/url?key=
///
/// Plain link to the object; access control is up to the store.
pub async fn object_url(
    State(state): State<AppState>,
    Query(q): Query<KeyQuery>,
) -> Result<Json<UrlResponse>, ApiError> {
    let url = state.pipeline.preview_url(&q.key)?;
    Ok(Json(UrlResponse { url }))
}

/// DELETE /objects?key=
pub async fn delete_object(
    State(state): State<AppState>,
    Query(q): Query<KeyQuery>,
) -> Result<StatusCode, ApiError> {
    state.pipeline.delete(&q.key).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /experiments/:experiment_id
pub async fn delete_experiment(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Query(q): Query<CleanupQuery>,
) -> Result<Json<CleanupStats>, ApiError> {
    let stats = object_store_cleanup::delete_experiment(
        state.pipeline.store(),
        &experiment_id,
        q.dry_run,
    )
    .await?;
    Ok(Json(stats))
}

/// DELETE /experiments/:experiment_id/tasks/:task_id
pub async fn delete_task_material(
    State(state): State<AppState>,
    Path((experiment_id, task_id)): Path<(String, String)>,
    Query(q): Query<CleanupQuery>,
) -> Result<Json<CleanupStats>, ApiError> {
    let stats = object_store_cleanup::delete_task_material(
        state.pipeline.store(),
        &experiment_id,
        &task_id,
        q.dry_run,
    )
    .await?;
    Ok(Json(stats))
}

/// DELETE /submissions/:student_id/:experiment_id/:task_id
pub async fn delete_task_submissions(
    State(state): State<AppState>,
    Path((student_id, experiment_id, task_id)): Path<(String, String, String)>,
    Query(q): Query<CleanupQuery>,
) -> Result<Json<CleanupStats>, ApiError> {
    let stats = object_store_cleanup::delete_task_submissions(
        state.pipeline.store(),
        &student_id,
        &experiment_id,
        &task_id,
        q.dry_run,
    )
    .await?;
    Ok(Json(stats))
}

/// DELETE /users/:user_id/avatars
pub async fn delete_user_avatars(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(q): Query<CleanupQuery>,
) -> Result<Json<CleanupStats>, ApiError> {
    let stats =
        object_store_cleanup::delete_user_avatars(state.pipeline.store(), &user_id, q.dry_run)
            .await?;
    Ok(Json(stats))
}

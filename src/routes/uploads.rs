use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header::CONTENT_TYPE, HeaderMap},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::keys::ResourceKind;
use crate::upload_pipeline::CodeFile;
use crate::{error::ApiError, AppState};

#[derive(Deserialize)]
pub struct FileQuery {
    pub filename: String,
}

#[derive(Deserialize)]
pub struct GenericQuery {
    pub resource_type: String,
    pub filename: String,
}

#[derive(Deserialize)]
pub struct ArchiveQuery {
    pub filename: String,
    pub task_id: Option<String>,
}

#[derive(Deserialize)]
pub struct CodeSubmissionRequest {
    pub files: Vec<CodeFile>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub ok: bool,
    pub key: String,
}

#[derive(Serialize)]
pub struct MultiUploadResponse {
    pub ok: bool,
    pub keys: Vec<String>,
}

fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn uploaded(key: String) -> Json<UploadResponse> {
    Json(UploadResponse { ok: true, key })
}

/// POST /uploads/generic?resource_type=&filename=
pub async fn upload_generic(
    State(state): State<AppState>,
    Query(q): Query<GenericQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let key = state
        .pipeline
        .upload_generic(body, content_type(&headers), &q.resource_type, &q.filename)
        .await?;
    Ok(uploaded(key))
}

/// POST /uploads/avatars/:user_id?filename=
pub async fn upload_avatar(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
    Query(q): Query<FileQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let key = state
        .pipeline
        .upload_avatar(&user_id, body, content_type(&headers), &q.filename)
        .await?;
    Ok(uploaded(key))
}

/// POST /experiments/:experiment_id/resources/:resource_type?filename=
///
/// `resource_type` is `resource` (learning material) or `experiment` (code).
pub async fn upload_experiment_resource(
    State(state): State<AppState>,
    Path((experiment_id, resource_type)): Path<(String, String)>,
    Query(q): Query<FileQuery>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let kind: ResourceKind = resource_type.parse()?;
    let key = state
        .pipeline
        .upload_experiment_resource(&experiment_id, kind, body, &q.filename)
        .await?;
    Ok(uploaded(key))
}

/// POST /experiments/:experiment_id/archives?filename=&task_id=
///
/// Extracts the archive into the experiment's code area and keeps the
/// original alongside.
pub async fn upload_archive(
    State(state): State<AppState>,
    Path(experiment_id): Path<String>,
    Query(q): Query<ArchiveQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<MultiUploadResponse>, ApiError> {
    let task_id = q.task_id.as_deref().map(str::trim).filter(|t| !t.is_empty());
    let keys = state
        .pipeline
        .upload_and_extract_archive(
            &experiment_id,
            task_id,
            body,
            &q.filename,
            content_type(&headers),
        )
        .await?;
    Ok(Json(MultiUploadResponse { ok: true, keys }))
}

/// POST /submissions/:student_id/:experiment_id/:task_id?filename=
pub async fn upload_submission(
    State(state): State<AppState>,
    Path((student_id, experiment_id, task_id)): Path<(String, String, String)>,
    Query(q): Query<FileQuery>,
    body: Bytes,
) -> Result<Json<UploadResponse>, ApiError> {
    let key = state
        .pipeline
        .upload_submission(&student_id, &experiment_id, &task_id, body, &q.filename)
        .await?;
    Ok(uploaded(key))
}

/// POST /submissions/:student_id/:experiment_id/:task_id/code
///
/// Body: `{"files":[{"filename":"Main.java","content":"..."}]}`
pub async fn upload_code_submission(
    State(state): State<AppState>,
    Path((student_id, experiment_id, task_id)): Path<(String, String, String)>,
    Json(req): Json<CodeSubmissionRequest>,
) -> Result<Json<MultiUploadResponse>, ApiError> {
    let keys = state
        .pipeline
        .upload_code_submission(&student_id, &experiment_id, &task_id, &req.files)
        .await?;
    Ok(Json(MultiUploadResponse { ok: true, keys }))
}

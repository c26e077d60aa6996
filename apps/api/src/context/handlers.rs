use axum::{
    extract::{Multipart, Path, State},
    Json,
};
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::auth::AdminAuth;
use crate::chat::engine::ContextStatus;
use crate::context::validation::{
    resume_object_key, validate_github_url, validate_upload, ValidationError,
};
use crate::errors::AppError;
use crate::models::profile::{ProfileRow, ProfileUpdate};
use crate::models::resume::ResumeRow;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub resume: ResumeRow,
    pub context: ContextStatus,
}

/// POST /api/v1/context/refresh
pub async fn handle_refresh_context(State(state): State<AppState>) -> Json<ContextStatus> {
    Json(state.engine.refresh_context(&state.assembler).await)
}

/// GET /api/v1/profile/:id
pub async fn handle_get_profile(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ProfileRow>, AppError> {
    let profile = state
        .store
        .fetch_profile_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Profile {id} not found")))?;
    Ok(Json(profile))
}

/// PUT /api/v1/profile/:id (admin)
pub async fn handle_update_profile(
    _admin: AdminAuth,
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(mut update): Json<ProfileUpdate>,
) -> Result<Json<ProfileRow>, AppError> {
    update.github_url = update.github_url.trim().to_string();
    validate_github_url(&update.github_url)?;

    let profile = state.store.upsert_profile(id, &update).await?;
    info!("Profile {id} updated");
    Ok(Json(profile))
}

/// POST /api/v1/resumes (admin)
///
/// Multipart form with a `file` field. Validation happens before the object
/// store is touched; the new resume becomes the only active one and the
/// assistant context is rebuilt from it.
pub async fn handle_upload_resume(
    _admin: AdminAuth,
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let (content_type, body) = read_file_field(&mut multipart).await?;
    validate_upload(body.len(), &content_type)?;

    let key = resume_object_key(&content_type, Utc::now());
    state
        .store
        .upload_resume_object(&key, body, &content_type)
        .await?;
    let resume = state.store.activate_resume(&key).await?;
    info!("Resume {key} uploaded and activated");

    let context = state.engine.refresh_context(&state.assembler).await;
    Ok(Json(UploadResponse { resume, context }))
}

async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Bytes), AppError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(e.body_text()))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|mime| mime.split(';').next().unwrap_or(mime).trim().to_string())
            .unwrap_or_default();
        let body = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(e.body_text()))?;
        return Ok((content_type, body));
    }
    Err(ValidationError::MissingFile.into())
}

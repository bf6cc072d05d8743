//! HTTP handlers for video records (metadata CRUD).
//! File uploads live in `upload_handlers`; these endpoints only touch the
//! database and, on delete, the thumbnail asset.

use crate::{
    auth::AuthUser, errors::AppError, models::video::NewVideo, services::asset_service,
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::warn;
use uuid::Uuid;

/// Request body for `POST /api/videos`.
#[derive(Debug, Deserialize)]
pub struct CreateVideoReq {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// POST `/api/videos` — create a draft record owned by the caller.
///
/// The record starts without URLs; upload endpoints fill those in later.
pub async fn create_video(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CreateVideoReq>,
) -> Result<impl IntoResponse, AppError> {
    let title = payload.title.trim();
    if title.is_empty() {
        return Err(AppError::bad_request("title must not be empty"));
    }

    let video = state
        .videos
        .create(NewVideo {
            user_id: user.user_id,
            title: title.to_string(),
            description: payload.description,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(video)))
}

/// GET `/api/videos` — list the caller's videos, newest first.
pub async fn list_videos(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let videos = state.videos.list_by_user(user.user_id).await?;
    Ok(Json(videos))
}

/// GET `/api/videos/{video_id}` — fetch one record.
///
/// Unauthenticated: playback pages resolve metadata through this endpoint.
pub async fn get_video(
    State(state): State<AppState>,
    Path(video_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let video = state
        .videos
        .get(video_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("video `{}` not found", video_id)))?;
    Ok(Json(video))
}

/// DELETE `/api/videos/{video_id}` — remove the caller's record.
///
/// The served thumbnail is removed best-effort; the stored video object is
/// left in place so already-shared playback URLs keep working.
pub async fn delete_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<Uuid>,
) -> Result<impl IntoResponse, AppError> {
    let video = state
        .videos
        .get(video_id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("video `{}` not found", video_id)))?;
    if video.user_id != user.user_id {
        return Err(AppError::forbidden(format!(
            "not the owner of video `{}`",
            video_id
        )));
    }

    state.videos.delete(video_id).await?;

    if let Some(name) = video
        .thumbnail_url
        .as_deref()
        .and_then(asset_service::name_from_url)
    {
        if let Err(err) = state.assets.remove(name).await {
            warn!("failed to remove thumbnail asset {}: {}", name, err);
        }
    }

    Ok(StatusCode::NO_CONTENT)
}

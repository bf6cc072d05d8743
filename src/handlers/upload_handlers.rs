//! Multipart upload handlers.
//! The video endpoint hands the file's byte stream straight to the ingest
//! pipeline without buffering; thumbnails are small enough to collect in
//! memory and write through the asset store.

use crate::{
    auth::AuthUser,
    errors::AppError,
    services::{
        asset_service,
        ingest_service::{self, UploadRequest},
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{HeaderMap, header},
    response::IntoResponse,
};
use futures::StreamExt;
use std::io;
use tracing::warn;
use uuid::Uuid;

/// Form field carrying the video file.
const VIDEO_FIELD: &str = "video";
/// Form field carrying the thumbnail image.
const THUMBNAIL_FIELD: &str = "thumbnail";

/// Upper bound on a thumbnail image.
const MAX_THUMBNAIL_BYTES: u64 = 10 << 20;

/// Allowance for multipart boundaries and part headers in one request.
/// Content-Length minus this is a lower bound on the file's own size.
const FRAMING_SLACK: u64 = 1 << 20;

/// Request body limits for the multipart routes: the media bound plus the
/// framing allowance, so the media-size checks inside the handlers fire
/// before the transport limit does.
pub const VIDEO_BODY_LIMIT: usize = (ingest_service::MAX_VIDEO_BYTES + FRAMING_SLACK) as usize;
pub const THUMBNAIL_BODY_LIMIT: usize = (MAX_THUMBNAIL_BYTES + FRAMING_SLACK) as usize;

/// POST `/api/videos/{video_id}/upload` — ingest the uploaded video file.
///
/// Streams the `video` form field through the ingest pipeline and returns the
/// updated record once the stored object is durable.
pub async fn upload_video(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<Uuid>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let declared_size = declared_file_size(&headers);

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(VIDEO_FIELD) {
            continue;
        }
        let content_type = field.content_type().map(|v| v.to_string());
        let stream =
            field.map(|chunk| chunk.map_err(|err| io::Error::new(io::ErrorKind::Other, err)));

        let video = state
            .ingest
            .ingest(UploadRequest {
                video_id,
                owner_id: user.user_id,
                declared_size,
                content_type,
                stream,
            })
            .await?;
        return Ok(Json(video));
    }

    Err(AppError::bad_request(format!(
        "missing `{}` form field",
        VIDEO_FIELD
    )))
}

/// POST `/api/videos/{video_id}/thumbnail` — replace the record's thumbnail.
///
/// Writes the new asset first and updates the record before the previous
/// asset is removed, so the record never points at a missing file.
pub async fn upload_thumbnail(
    State(state): State<AppState>,
    user: AuthUser,
    Path(video_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AppError> {
    let mut video = state
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

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some(THUMBNAIL_FIELD) {
            continue;
        }
        let content_type = field
            .content_type()
            .map(|v| v.to_string())
            .ok_or_else(|| AppError::bad_request("missing thumbnail content type"))?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        if bytes.len() as u64 > MAX_THUMBNAIL_BYTES {
            return Err(AppError::bad_request(format!(
                "thumbnail exceeds the {} byte limit",
                MAX_THUMBNAIL_BYTES
            )));
        }

        let name = state.assets.put(&bytes, &content_type).await?;
        let previous = video.thumbnail_url.take();
        video.thumbnail_url = Some(format!(
            "{}/assets/{}",
            state.public_base_url.trim_end_matches('/'),
            name
        ));
        let updated = match state.videos.update(&video).await {
            Ok(updated) => updated,
            Err(err) => {
                if let Err(remove_err) = state.assets.remove(&name).await {
                    warn!("failed to remove orphaned thumbnail {}: {}", name, remove_err);
                }
                return Err(err.into());
            }
        };

        if let Some(old) = previous.as_deref().and_then(asset_service::name_from_url) {
            if let Err(err) = state.assets.remove(old).await {
                warn!("failed to remove replaced thumbnail {}: {}", old, err);
            }
        }
        return Ok(Json(updated));
    }

    Err(AppError::bad_request(format!(
        "missing `{}` form field",
        THUMBNAIL_FIELD
    )))
}

/// Estimate the uploaded file's size from the request's Content-Length.
///
/// The header counts the multipart framing too, so the framing allowance is
/// deducted; the estimate never exceeds the file's own size, and a file
/// sitting right at the media bound passes the pre-stream check. Requests
/// without a parseable header skip that check and rely on the drain cap.
fn declared_file_size(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .map(|total| total.saturating_sub(FRAMING_SLACK))
}

fn multipart_error(err: MultipartError) -> AppError {
    AppError::bad_request(format!("malformed multipart body: {}", err))
}

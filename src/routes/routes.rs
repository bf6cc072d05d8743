//! Defines routes for the video API.
//!
//! ## Structure
//! - **Health endpoints**
//!   - `GET    /healthz` — liveness
//!   - `GET    /readyz`  — readiness (SQLite + scratch dir)
//!
//! - **Video endpoints** (bearer token required unless noted)
//!   - `POST   /api/videos` — create a draft record
//!   - `GET    /api/videos` — list the caller's records
//!   - `GET    /api/videos/{video_id}` — fetch one record (public)
//!   - `DELETE /api/videos/{video_id}` — delete the caller's record
//!   - `POST   /api/videos/{video_id}/upload` — ingest the video file
//!   - `POST   /api/videos/{video_id}/thumbnail` — replace the thumbnail
//!
//! - **Asset endpoints**
//!   - `GET    /assets/{file_name}` — serve a stored thumbnail (public)

use crate::{
    handlers::{
        asset_handlers::get_asset,
        health_handlers::{healthz, readyz},
        upload_handlers::{self, upload_thumbnail, upload_video},
        video_handlers::{create_video, delete_video, get_video, list_videos},
    },
    state::AppState,
};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Build and return the router for every endpoint.
///
/// The router carries shared state (`AppState`) to all handlers. The two
/// multipart routes raise the request body limit to just above their
/// media-size bounds; everything else keeps axum's default.
pub fn routes() -> Router<AppState> {
    Router::new()
        // health endpoints (mounted at root)
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        // video records
        .route("/api/videos", post(create_video).get(list_videos))
        .route(
            "/api/videos/{video_id}",
            get(get_video).delete(delete_video),
        )
        // media uploads
        .route(
            "/api/videos/{video_id}/upload",
            post(upload_video).layer(DefaultBodyLimit::max(upload_handlers::VIDEO_BODY_LIMIT)),
        )
        .route(
            "/api/videos/{video_id}/thumbnail",
            post(upload_thumbnail)
                .layer(DefaultBodyLimit::max(upload_handlers::THUMBNAIL_BODY_LIMIT)),
        )
        // served assets
        .route("/assets/{file_name}", get(get_asset))
}

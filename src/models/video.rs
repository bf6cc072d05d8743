//! Represents a user-owned video record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A video record as tracked by the service.
///
/// The record exists before any file has been ingested; `video_url` stays
/// `None` until an uploaded file has been durably accepted by object storage.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Video {
    /// Unique identifier for this video (UUID for internal DB use).
    pub id: Uuid,

    /// ID of the user who owns this video.
    pub user_id: Uuid,

    /// Display title chosen by the owner.
    pub title: String,

    /// Free-form description; empty string when the owner provided none.
    pub description: String,

    /// Public playback URL. Set only once the stored object is durable.
    pub video_url: Option<String>,

    /// URL of the served thumbnail asset, if one has been uploaded.
    pub thumbnail_url: Option<String>,

    /// When this record was created.
    pub created_at: DateTime<Utc>,

    /// When this record was last modified.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a fresh video record.
#[derive(Debug, Clone)]
pub struct NewVideo {
    pub user_id: Uuid,
    pub title: String,
    pub description: String,
}

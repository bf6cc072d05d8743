//! Video record store backed by SQLite.
//!
//! The ingestion pipeline treats this as its record collaborator: it reads a
//! record before running and writes it back exactly once, after the uploaded
//! object is durable.

use crate::models::video::{NewVideo, Video};
use chrono::Utc;
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

const VIDEO_COLUMNS: &str =
    "id, user_id, title, description, video_url, thumbnail_url, created_at, updated_at";

/// Store for `Video` records over a shared SQLite pool.
#[derive(Clone)]
pub struct VideoStore {
    db: Arc<SqlitePool>,
}

impl VideoStore {
    pub fn new(db: Arc<SqlitePool>) -> Self {
        Self { db }
    }

    /// Insert a fresh record with no media attached yet.
    pub async fn create(&self, new: NewVideo) -> Result<Video, sqlx::Error> {
        let now = Utc::now();
        sqlx::query_as::<_, Video>(&format!(
            "INSERT INTO videos ({VIDEO_COLUMNS})
             VALUES (?, ?, ?, ?, NULL, NULL, ?, ?)
             RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await
    }

    /// Fetch a record by id. Returns `None` when no such video exists.
    pub async fn get(&self, id: Uuid) -> Result<Option<Video>, sqlx::Error> {
        sqlx::query_as::<_, Video>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&*self.db)
        .await
    }

    /// Write back mutable fields of an existing record and bump `updated_at`.
    ///
    /// Returns the stored row. Fails with `RowNotFound` if the record has
    /// disappeared since it was read.
    pub async fn update(&self, video: &Video) -> Result<Video, sqlx::Error> {
        sqlx::query_as::<_, Video>(&format!(
            "UPDATE videos
             SET title = ?, description = ?, video_url = ?, thumbnail_url = ?, updated_at = ?
             WHERE id = ?
             RETURNING {VIDEO_COLUMNS}"
        ))
        .bind(&video.title)
        .bind(&video.description)
        .bind(&video.video_url)
        .bind(&video.thumbnail_url)
        .bind(Utc::now())
        .bind(video.id)
        .fetch_one(&*self.db)
        .await
    }

    /// All records owned by `user_id`, newest first.
    pub async fn list_by_user(&self, user_id: Uuid) -> Result<Vec<Video>, sqlx::Error> {
        sqlx::query_as::<_, Video>(&format!(
            "SELECT {VIDEO_COLUMNS} FROM videos WHERE user_id = ? ORDER BY created_at DESC"
        ))
        .bind(user_id)
        .fetch_all(&*self.db)
        .await
    }

    /// Delete a record. Returns `false` when the id was already gone.
    pub async fn delete(&self, id: Uuid) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM videos WHERE id = ?")
            .bind(id)
            .execute(&*self.db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

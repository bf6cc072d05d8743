//! Shared application state.

use crate::{
    db::videos::VideoStore,
    services::{asset_service::AssetStore, ingest_service::IngestService},
};
use sqlx::SqlitePool;
use std::{path::PathBuf, sync::Arc};

/// State handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<SqlitePool>,
    pub videos: VideoStore,
    pub ingest: IngestService,
    pub assets: AssetStore,
    pub jwt_secret: String,
    pub public_base_url: String,
    pub scratch_dir: PathBuf,
}

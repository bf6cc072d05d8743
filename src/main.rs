use anyhow::Result;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Arc,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod db;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;
mod state;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config + migrate flag ---
    let (cfg, migrate) = config::AppConfig::from_env_and_args()?;

    // Deliberately not the full config: jwt_secret must stay out of the logs.
    tracing::info!(
        "Starting clipshelf on {} (db: {}, bucket: {}, scratch: {})",
        cfg.addr(),
        cfg.database_url,
        cfg.s3_bucket,
        cfg.scratch_dir
    );

    // --- Ensure scratch directory exists ---
    if !Path::new(&cfg.scratch_dir).exists() {
        fs::create_dir_all(&cfg.scratch_dir)?;
        tracing::info!("Created scratch directory at {}", cfg.scratch_dir);
    }

    // --- Initialize SQLite connection ---
    let db_url = &cfg.database_url;
    tracing::debug!("Connecting using raw URL => {}", db_url);

    // Create the database file's parent directory if needed
    let db_path = db_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("file:");
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::info!("Created missing directory {:?}", parent);
        }
    }

    let connect_opts = SqliteConnectOptions::from_str(db_url)?.create_if_missing(true);
    let db: Arc<sqlx::Pool<sqlx::Sqlite>> = Arc::new(
        SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(connect_opts)
            .await?,
    );

    // --- Run migrations (also handles `--migrate` mode) ---
    db::MIGRATOR.run(&*db).await?;
    if migrate {
        tracing::info!("Database migration complete.");
        return Ok(());
    }

    // --- Initialize core services ---
    let videos = db::videos::VideoStore::new(db.clone());
    let media = services::media_service::MediaService::new(
        Arc::new(services::media_service::SystemToolRunner),
        cfg.ffmpeg_path.clone(),
        cfg.ffprobe_path.clone(),
    );
    let storage = Arc::new(
        services::storage_service::S3Storage::new(
            cfg.s3_bucket.clone(),
            cfg.s3_region.clone(),
            cfg.s3_endpoint.clone(),
        )
        .await,
    );
    let ingest = services::ingest_service::IngestService::new(
        videos.clone(),
        media,
        storage,
        cfg.scratch_dir.clone(),
        cfg.cdn_base_url.clone(),
    );
    let assets = services::asset_service::AssetStore::new(cfg.assets_dir.clone());
    assets.ensure_root().await?;

    let state = state::AppState {
        db: db.clone(),
        videos,
        ingest,
        assets,
        jwt_secret: cfg.jwt_secret.clone(),
        public_base_url: cfg.public_base_url.clone(),
        scratch_dir: PathBuf::from(&cfg.scratch_dir),
    };

    // --- Build router ---
    let app: Router = routes::routes::routes().with_state(state);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

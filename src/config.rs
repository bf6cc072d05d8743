use anyhow::{Context, Result};
use clap::Parser;
use std::env;

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub scratch_dir: String,
    pub assets_dir: String,
    pub jwt_secret: String,
    pub s3_bucket: String,
    pub s3_region: String,
    pub s3_endpoint: Option<String>,
    pub cdn_base_url: String,
    pub public_base_url: String,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Video upload and ingestion API")]
pub struct Args {
    /// Host to bind to (overrides CLIPSHELF_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides CLIPSHELF_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Database URL (overrides CLIPSHELF_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Scratch directory for in-flight uploads (overrides CLIPSHELF_SCRATCH_DIR)
    #[arg(long)]
    pub scratch_dir: Option<String>,

    /// Directory for served assets (overrides CLIPSHELF_ASSETS_DIR)
    #[arg(long)]
    pub assets_dir: Option<String>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        // Parse CLI once
        let args = Args::parse();

        // --- Environment fallback ---
        let env_host = env::var("CLIPSHELF_HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let env_port = match env::var("CLIPSHELF_PORT") {
            Ok(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing CLIPSHELF_PORT value `{}`", value))?,
            Err(env::VarError::NotPresent) => 3000,
            Err(err) => return Err(err).context("reading CLIPSHELF_PORT"),
        };
        let env_db = env::var("CLIPSHELF_DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://./data/clipshelf.db".into());
        let env_scratch = env::var("CLIPSHELF_SCRATCH_DIR").unwrap_or_else(|_| "./tmp".into());
        let env_assets = env::var("CLIPSHELF_ASSETS_DIR").unwrap_or_else(|_| "./assets".into());

        let jwt_secret =
            env::var("CLIPSHELF_JWT_SECRET").context("CLIPSHELF_JWT_SECRET must be set")?;
        let s3_bucket =
            env::var("CLIPSHELF_S3_BUCKET").context("CLIPSHELF_S3_BUCKET must be set")?;
        let s3_region = env::var("CLIPSHELF_S3_REGION").unwrap_or_else(|_| "us-east-1".into());
        let s3_endpoint = env::var("CLIPSHELF_S3_ENDPOINT").ok();

        // The bucket's own public URL stands in when no CDN is configured.
        let cdn_base_url = env::var("CLIPSHELF_CDN_BASE_URL").unwrap_or_else(|_| {
            format!("https://{}.s3.{}.amazonaws.com", s3_bucket, s3_region)
        });

        let ffmpeg_path = env::var("CLIPSHELF_FFMPEG").unwrap_or_else(|_| "ffmpeg".into());
        let ffprobe_path = env::var("CLIPSHELF_FFPROBE").unwrap_or_else(|_| "ffprobe".into());

        // --- Merge ---
        let port = args.port.unwrap_or(env_port);
        let public_base_url = env::var("CLIPSHELF_PUBLIC_BASE_URL")
            .unwrap_or_else(|_| format!("http://localhost:{}", port));

        let cfg = Self {
            host: args.host.unwrap_or(env_host),
            port,
            database_url: args.database_url.unwrap_or(env_db),
            scratch_dir: args.scratch_dir.unwrap_or(env_scratch),
            assets_dir: args.assets_dir.unwrap_or(env_assets),
            jwt_secret,
            s3_bucket,
            s3_region,
            s3_endpoint,
            cdn_base_url,
            public_base_url,
            ffmpeg_path,
            ffprobe_path,
        };

        Ok((cfg, args.migrate))
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

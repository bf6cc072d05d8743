//! Disk-backed store for served assets (thumbnails).
//!
//! Assets live flat under one root directory with random hex names; the store
//! owns naming, media-type mapping and removal so nothing else touches the
//! directory directly.

use rand::Rng;
use std::{
    io::{self, ErrorKind},
    path::PathBuf,
};
use thiserror::Error;
use tokio::fs::{self, File};

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("unsupported media type `{0}`")]
    UnsupportedMediaType(String),
    #[error("invalid asset name")]
    InvalidName,
    #[error("asset `{0}` not found")]
    NotFound(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type AssetResult<T> = Result<T, AssetError>;

/// Store for small served files under a single root directory.
#[derive(Clone)]
pub struct AssetStore {
    root: PathBuf,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the root directory if it does not exist yet.
    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    /// Write `bytes` under a fresh random name and return that name.
    pub async fn put(&self, bytes: &[u8], media_type: &str) -> AssetResult<String> {
        let ext = extension_for(media_type)
            .ok_or_else(|| AssetError::UnsupportedMediaType(media_type.to_string()))?;
        let id: [u8; 16] = rand::rng().random();
        let name = format!("{}.{}", hex::encode(id), ext);
        fs::write(self.root.join(&name), bytes).await?;
        Ok(name)
    }

    /// Open a stored asset for streaming out, with its content type.
    pub async fn open(&self, name: &str) -> AssetResult<(File, &'static str)> {
        ensure_name_safe(name)?;
        let content_type = content_type_for(name);
        let file = File::open(self.root.join(name)).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                AssetError::NotFound(name.to_string())
            } else {
                AssetError::Io(err)
            }
        })?;
        Ok((file, content_type))
    }

    /// Remove a stored asset. Removing a name that is already gone is a no-op.
    pub async fn remove(&self, name: &str) -> AssetResult<()> {
        ensure_name_safe(name)?;
        match fs::remove_file(self.root.join(name)).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(AssetError::Io(err)),
        }
    }
}

/// Extract the stored name from a public asset URL.
///
/// Returns `None` for URLs that do not end in a name, so callers can skip
/// removal instead of erroring on records written before thumbnails existed.
pub fn name_from_url(url: &str) -> Option<&str> {
    url.rsplit('/').next().filter(|name| !name.is_empty())
}

/// Reject names that could escape the root directory.
fn ensure_name_safe(name: &str) -> AssetResult<()> {
    if name.is_empty() || name.contains("..") {
        return Err(AssetError::InvalidName);
    }
    if name
        .bytes()
        .any(|b| b == b'/' || b == b'\\' || b.is_ascii_control() || b == b'\0')
    {
        return Err(AssetError::InvalidName);
    }
    Ok(())
}

fn extension_for(media_type: &str) -> Option<&'static str> {
    match media_type {
        "image/jpeg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

fn content_type_for(name: &str) -> &'static str {
    if name.ends_with(".jpg") {
        "image/jpeg"
    } else if name.ends_with(".png") {
        "image/png"
    } else {
        "application/octet-stream"
    }
}

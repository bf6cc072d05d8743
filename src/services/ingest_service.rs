//! The video ingestion pipeline.
//!
//! One upload runs as a single sequential pass: drain the byte stream into a
//! scratch file, probe its geometry, classify the orientation, remux for
//! progressive playback, push the remuxed file to object storage, then write
//! the final URL into the video record. Every scratch artifact created along
//! the way is removed on every exit path; the record is written only after
//! storage has durably accepted the object.

use crate::db::videos::VideoStore;
use crate::models::video::Video;
use crate::services::media_service::{self, MediaError, MediaService, classify};
use crate::services::storage_service::{ObjectStorage, StorageError};
use bytes::Bytes;
use futures::{Stream, StreamExt, pin_mut};
use rand::Rng;
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use thiserror::Error;
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, warn};
use uuid::Uuid;

/// Upper bound on an uploaded video, declared or streamed.
pub const MAX_VIDEO_BYTES: u64 = 1 << 30;

const ACCEPTED_VIDEO_TYPES: [&str; 1] = ["video/mp4"];

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Validation(String),
    #[error("video `{0}` not found")]
    NotFound(Uuid),
    #[error("not the owner of video `{0}`")]
    Forbidden(Uuid),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type IngestResult<T> = Result<T, IngestError>;

/// One inbound upload, as handed over by the HTTP boundary.
///
/// `declared_size` is the boundary's estimate of the file's own size and
/// must not overshoot it (the HTTP layer deducts a framing allowance from
/// Content-Length). A missing or low estimate only defers rejection to the
/// drain cap.
pub struct UploadRequest<S> {
    pub video_id: Uuid,
    pub owner_id: Uuid,
    pub declared_size: Option<u64>,
    pub content_type: Option<String>,
    pub stream: S,
}

/// Scratch artifacts registered for unconditional removal.
///
/// Paths are registered before the step that creates them runs, so a step
/// that fails halfway still gets its partial output cleaned up.
struct Scratch {
    paths: Vec<PathBuf>,
}

impl Scratch {
    fn new() -> Self {
        Self { paths: Vec::new() }
    }

    fn register(&mut self, path: PathBuf) {
        self.paths.push(path);
    }

    /// Remove every registered artifact. Failures are logged, never
    /// escalated; an already-missing file counts as removed.
    async fn cleanup(&mut self) {
        for path in self.paths.drain(..) {
            match fs::remove_file(&path).await {
                Ok(()) => debug!("removed scratch file {}", path.display()),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!("failed to remove scratch file {}: {}", path.display(), err),
            }
        }
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        // Backstop for futures dropped mid-pipeline; ordinary exits have
        // already drained `paths` in cleanup().
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!("failed to remove scratch file {}: {}", path.display(), err),
            }
        }
    }
}

/// Orchestrates one ingestion attempt per call.
#[derive(Clone)]
pub struct IngestService {
    videos: VideoStore,
    media: MediaService,
    storage: Arc<dyn ObjectStorage>,
    scratch_dir: PathBuf,
    cdn_base_url: String,
}

impl IngestService {
    pub fn new(
        videos: VideoStore,
        media: MediaService,
        storage: Arc<dyn ObjectStorage>,
        scratch_dir: impl Into<PathBuf>,
        cdn_base_url: impl Into<String>,
    ) -> Self {
        Self {
            videos,
            media,
            storage,
            scratch_dir: scratch_dir.into(),
            cdn_base_url: cdn_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Run the full pipeline for one upload.
    ///
    /// On success the updated record is returned; on any failure the record
    /// keeps its previous state. Scratch artifacts are removed either way.
    /// Validation happens before the stream is polled, so a rejected request
    /// never touches the scratch directory.
    pub async fn ingest<S>(&self, req: UploadRequest<S>) -> IngestResult<Video>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let video = self
            .videos
            .get(req.video_id)
            .await?
            .ok_or(IngestError::NotFound(req.video_id))?;
        if video.user_id != req.owner_id {
            return Err(IngestError::Forbidden(req.video_id));
        }
        let content_type = validate_upload(req.declared_size, req.content_type.as_deref())?;

        let mut scratch = Scratch::new();
        let result = self
            .run_pipeline(video, content_type, req.stream, &mut scratch)
            .await;
        scratch.cleanup().await;
        result
    }

    async fn run_pipeline<S>(
        &self,
        mut video: Video,
        content_type: String,
        stream: S,
        scratch: &mut Scratch,
    ) -> IngestResult<Video>
    where
        S: Stream<Item = io::Result<Bytes>> + Send,
    {
        let file_name = scratch_file_name();
        let original = self.scratch_dir.join(&file_name);
        scratch.register(original.clone());
        drain_to_file(stream, &original).await?;

        let geometry = self.media.probe(&original).await?;
        let orientation = classify(geometry.width, geometry.height);

        scratch.register(media_service::remux_output_path(&original));
        let remuxed = self.media.remux(&original).await?;

        let key = format!("{}/{}", orientation.as_str(), file_name);
        self.storage
            .upload_file(&remuxed, &key, &content_type)
            .await?;

        video.video_url = Some(format!("{}/{}", self.cdn_base_url, key));
        let updated = self.videos.update(&video).await?;
        Ok(updated)
    }
}

fn validate_upload(
    declared_size: Option<u64>,
    content_type: Option<&str>,
) -> IngestResult<String> {
    if let Some(size) = declared_size {
        if size > MAX_VIDEO_BYTES {
            return Err(IngestError::Validation(format!(
                "declared size {} exceeds the {} byte limit",
                size, MAX_VIDEO_BYTES
            )));
        }
    }
    let content_type = content_type
        .ok_or_else(|| IngestError::Validation("missing content type".to_string()))?;
    if !ACCEPTED_VIDEO_TYPES.contains(&content_type) {
        return Err(IngestError::Validation(format!(
            "unsupported content type `{}`",
            content_type
        )));
    }
    Ok(content_type.to_string())
}

/// A fresh collision-resistant artifact name: 32 random bytes, hex-encoded,
/// with the container extension.
fn scratch_file_name() -> String {
    let bytes: [u8; 32] = rand::rng().random();
    format!("{}.mp4", hex::encode(bytes))
}

/// Drain the stream into `path`, fsyncing before return.
///
/// The running byte count enforces the upload bound even when the declared
/// size was absent or dishonest.
async fn drain_to_file<S>(stream: S, path: &Path) -> IngestResult<()>
where
    S: Stream<Item = io::Result<Bytes>> + Send,
{
    let mut file = File::create(path).await?;
    let mut written: u64 = 0;
    pin_mut!(stream);
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > MAX_VIDEO_BYTES {
            return Err(IngestError::Validation(format!(
                "upload exceeds the {} byte limit",
                MAX_VIDEO_BYTES
            )));
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::video::NewVideo;
    use crate::services::media_service::{ToolOutput, ToolRunner};
    use crate::services::storage_service::StorageResult;
    use async_trait::async_trait;
    use futures::stream;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::sync::{
        Mutex,
        atomic::{AtomicBool, Ordering},
    };
    use tempfile::TempDir;

    const PROBE_LANDSCAPE: &str = r#"{"streams": [{"width": 1920, "height": 1080}]}"#;
    const PROBE_PORTRAIT: &str = r#"{"streams": [{"width": 1080, "height": 1920}]}"#;

    struct ScriptedRunner {
        probe_exit: i32,
        probe_json: &'static str,
        remux_exit: i32,
    }

    impl ScriptedRunner {
        fn ok(probe_json: &'static str) -> Self {
            Self {
                probe_exit: 0,
                probe_json,
                remux_exit: 0,
            }
        }
    }

    #[async_trait]
    impl ToolRunner for ScriptedRunner {
        async fn run(&self, program: &str, args: &[String]) -> io::Result<ToolOutput> {
            if program == "ffprobe" {
                return Ok(ToolOutput {
                    exit_code: Some(self.probe_exit),
                    stdout: self.probe_json.as_bytes().to_vec(),
                    stderr: b"probe says no".to_vec(),
                });
            }
            if self.remux_exit != 0 {
                return Ok(ToolOutput {
                    exit_code: Some(self.remux_exit),
                    stdout: Vec::new(),
                    stderr: b"muxer exploded".to_vec(),
                });
            }
            let out = args.last().cloned().unwrap_or_default();
            tokio::fs::write(&out, b"remuxed").await?;
            Ok(ToolOutput {
                exit_code: Some(0),
                stdout: Vec::new(),
                stderr: Vec::new(),
            })
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        uploads: Mutex<Vec<(String, String, String, bool)>>,
        reject: AtomicBool,
    }

    impl RecordingStorage {
        fn uploads(&self) -> Vec<(String, String, String, bool)> {
            self.uploads.lock().unwrap().clone()
        }

        fn reject_uploads(&self) {
            self.reject.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl ObjectStorage for RecordingStorage {
        async fn upload_file(
            &self,
            path: &Path,
            key: &str,
            content_type: &str,
        ) -> StorageResult<()> {
            if self.reject.load(Ordering::SeqCst) {
                return Err(StorageError::Upload {
                    key: key.to_string(),
                    reason: "upload refused".to_string(),
                });
            }
            self.uploads.lock().unwrap().push((
                path.display().to_string(),
                key.to_string(),
                content_type.to_string(),
                path.exists(),
            ));
            Ok(())
        }
    }

    struct Rig {
        ingest: IngestService,
        videos: VideoStore,
        storage: Arc<RecordingStorage>,
        scratch: TempDir,
    }

    async fn rig(runner: ScriptedRunner) -> Rig {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::db::MIGRATOR.run(&pool).await.unwrap();
        let videos = VideoStore::new(Arc::new(pool));
        let storage = Arc::new(RecordingStorage::default());
        let scratch = TempDir::new().unwrap();
        let media = MediaService::new(Arc::new(runner), "ffmpeg", "ffprobe");
        let ingest = IngestService::new(
            videos.clone(),
            media,
            storage.clone(),
            scratch.path().to_path_buf(),
            "https://cdn.example.com/",
        );
        Rig {
            ingest,
            videos,
            storage,
            scratch,
        }
    }

    async fn seed_video(videos: &VideoStore, owner: Uuid) -> Video {
        videos
            .create(NewVideo {
                user_id: owner,
                title: "clip".into(),
                description: String::new(),
            })
            .await
            .unwrap()
    }

    fn scratch_entries(scratch: &TempDir) -> usize {
        std::fs::read_dir(scratch.path()).unwrap().count()
    }

    fn tracked_stream(
        polled: Arc<AtomicBool>,
    ) -> impl Stream<Item = io::Result<Bytes>> + Send {
        stream::iter(vec![Ok(Bytes::from_static(b"mp4 bytes"))])
            .inspect(move |_| polled.store(true, Ordering::SeqCst))
    }

    fn request<S>(video: &Video, stream: S) -> UploadRequest<S> {
        UploadRequest {
            video_id: video.id,
            owner_id: video.user_id,
            declared_size: Some(1024),
            content_type: Some("video/mp4".into()),
            stream,
        }
    }

    #[tokio::test]
    async fn happy_path_uploads_remuxed_file_and_sets_video_url() {
        let owner = Uuid::new_v4();
        let rig = rig(ScriptedRunner::ok(PROBE_LANDSCAPE)).await;
        let video = seed_video(&rig.videos, owner).await;

        let updated = rig
            .ingest
            .ingest(request(&video, tracked_stream(Arc::new(AtomicBool::new(false)))))
            .await
            .unwrap();

        let uploads = rig.storage.uploads();
        assert_eq!(uploads.len(), 1);
        let (path, key, content_type, existed) = &uploads[0];
        assert!(path.ends_with(".processing.mp4"));
        assert!(*existed, "remuxed artifact must exist at upload time");
        assert_eq!(content_type, "video/mp4");
        assert!(key.starts_with("landscape/"));
        assert!(key.ends_with(".mp4"));

        assert_eq!(
            updated.video_url.as_deref(),
            Some(format!("https://cdn.example.com/{}", key).as_str())
        );
        let stored = rig.videos.get(video.id).await.unwrap().unwrap();
        assert_eq!(stored.video_url, updated.video_url);

        assert_eq!(scratch_entries(&rig.scratch), 0);
    }

    #[tokio::test]
    async fn portrait_geometry_lands_under_portrait_prefix() {
        let owner = Uuid::new_v4();
        let rig = rig(ScriptedRunner::ok(PROBE_PORTRAIT)).await;
        let video = seed_video(&rig.videos, owner).await;

        let updated = rig
            .ingest
            .ingest(request(&video, tracked_stream(Arc::new(AtomicBool::new(false)))))
            .await
            .unwrap();

        assert!(
            updated
                .video_url
                .as_deref()
                .unwrap()
                .starts_with("https://cdn.example.com/portrait/")
        );
    }

    #[tokio::test]
    async fn oversized_declared_upload_is_rejected_before_the_stream_is_read() {
        let owner = Uuid::new_v4();
        let rig = rig(ScriptedRunner::ok(PROBE_LANDSCAPE)).await;
        let video = seed_video(&rig.videos, owner).await;

        let polled = Arc::new(AtomicBool::new(false));
        let mut req = request(&video, tracked_stream(polled.clone()));
        req.declared_size = Some(2 * 1024 * 1024 * 1024);

        let err = rig.ingest.ingest(req).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert!(!polled.load(Ordering::SeqCst), "stream must not be consumed");
        assert_eq!(scratch_entries(&rig.scratch), 0);
    }

    #[tokio::test]
    async fn wrong_content_type_is_rejected_before_the_stream_is_read() {
        let owner = Uuid::new_v4();
        let rig = rig(ScriptedRunner::ok(PROBE_LANDSCAPE)).await;
        let video = seed_video(&rig.videos, owner).await;

        let polled = Arc::new(AtomicBool::new(false));
        let mut req = request(&video, tracked_stream(polled.clone()));
        req.content_type = Some("video/quicktime".into());

        let err = rig.ingest.ingest(req).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert!(!polled.load(Ordering::SeqCst));

        req = request(&video, tracked_stream(polled.clone()));
        req.content_type = None;
        let err = rig.ingest.ingest(req).await.unwrap_err();
        assert!(matches!(err, IngestError::Validation(_)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn probe_failure_aborts_and_leaves_record_untouched() {
        let owner = Uuid::new_v4();
        let rig = rig(ScriptedRunner {
            probe_exit: 1,
            probe_json: "",
            remux_exit: 0,
        })
        .await;
        let video = seed_video(&rig.videos, owner).await;

        let err = rig
            .ingest
            .ingest(request(&video, tracked_stream(Arc::new(AtomicBool::new(false)))))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Media(MediaError::Probe { .. })));

        assert_eq!(scratch_entries(&rig.scratch), 0);
        assert!(rig.storage.uploads().is_empty());
        let stored = rig.videos.get(video.id).await.unwrap().unwrap();
        assert_eq!(stored.video_url, None);
    }

    #[tokio::test]
    async fn remux_failure_cleans_every_artifact() {
        let owner = Uuid::new_v4();
        let rig = rig(ScriptedRunner {
            probe_exit: 0,
            probe_json: PROBE_LANDSCAPE,
            remux_exit: 1,
        })
        .await;
        let video = seed_video(&rig.videos, owner).await;

        let err = rig
            .ingest
            .ingest(request(&video, tracked_stream(Arc::new(AtomicBool::new(false)))))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Media(MediaError::Remux { .. })));

        assert_eq!(scratch_entries(&rig.scratch), 0);
        assert!(rig.storage.uploads().is_empty());
    }

    #[tokio::test]
    async fn storage_failure_never_writes_the_record() {
        let owner = Uuid::new_v4();
        let rig = rig(ScriptedRunner::ok(PROBE_LANDSCAPE)).await;
        rig.storage.reject_uploads();
        let video = seed_video(&rig.videos, owner).await;

        let err = rig
            .ingest
            .ingest(request(&video, tracked_stream(Arc::new(AtomicBool::new(false)))))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            IngestError::Storage(StorageError::Upload { .. })
        ));

        let stored = rig.videos.get(video.id).await.unwrap().unwrap();
        assert_eq!(stored.video_url, None);
        assert_eq!(scratch_entries(&rig.scratch), 0);
    }

    #[tokio::test]
    async fn unknown_video_is_not_found() {
        let rig = rig(ScriptedRunner::ok(PROBE_LANDSCAPE)).await;
        let polled = Arc::new(AtomicBool::new(false));

        let err = rig
            .ingest
            .ingest(UploadRequest {
                video_id: Uuid::new_v4(),
                owner_id: Uuid::new_v4(),
                declared_size: Some(1024),
                content_type: Some("video/mp4".into()),
                stream: tracked_stream(polled.clone()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::NotFound(_)));
        assert!(!polled.load(Ordering::SeqCst));
        assert_eq!(scratch_entries(&rig.scratch), 0);
    }

    #[tokio::test]
    async fn non_owner_is_forbidden() {
        let rig = rig(ScriptedRunner::ok(PROBE_LANDSCAPE)).await;
        let video = seed_video(&rig.videos, Uuid::new_v4()).await;

        let polled = Arc::new(AtomicBool::new(false));
        let mut req = request(&video, tracked_stream(polled.clone()));
        req.owner_id = Uuid::new_v4();

        let err = rig.ingest.ingest(req).await.unwrap_err();
        assert!(matches!(err, IngestError::Forbidden(_)));
        assert!(!polled.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn scratch_cleanup_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("artifact.mp4");
        tokio::fs::write(&path, b"x").await.unwrap();

        let mut scratch = Scratch::new();
        scratch.register(path.clone());
        scratch.cleanup().await;
        assert!(!path.exists());

        scratch.register(path.clone());
        scratch.cleanup().await;
        scratch.register(path);
        drop(scratch);
    }
}

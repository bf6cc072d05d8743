//! Media inspection and remuxing via external tools.
//!
//! Everything that shells out goes through the `ToolRunner` seam so the
//! pipeline can be exercised without real ffmpeg/ffprobe binaries.

use async_trait::async_trait;
use serde::Deserialize;
use std::{
    io,
    path::{Path, PathBuf},
    process::Stdio,
    sync::Arc,
};
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Marker inserted before the extension of a remuxed artifact's file name.
const REMUX_MARKER: &str = "processing";

/// Aspect ratios strictly above this bucket as landscape.
const LANDSCAPE_RATIO: f64 = 1.5;
/// Aspect ratios strictly below this bucket as portrait.
const PORTRAIT_RATIO: f64 = 0.75;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("probe of `{path}` failed: {reason}")]
    Probe { path: String, reason: String },
    #[error("remux of `{path}` failed: {reason}")]
    Remux { path: String, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type MediaResult<T> = Result<T, MediaError>;

/// Captured result of one external tool invocation.
#[derive(Debug)]
pub struct ToolOutput {
    /// Process exit code; `None` when terminated by a signal.
    pub exit_code: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Runs an external command to completion and captures its output.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<ToolOutput>;
}

/// `ToolRunner` backed by real child processes.
pub struct SystemToolRunner;

#[async_trait]
impl ToolRunner for SystemToolRunner {
    async fn run(&self, program: &str, args: &[String]) -> io::Result<ToolOutput> {
        debug!("running {} {}", program, args.join(" "));
        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await?;
        Ok(ToolOutput {
            exit_code: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Video stream geometry in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
}

/// Coarse aspect-ratio bucket, used only as a storage key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Landscape,
    Portrait,
    Other,
}

impl Orientation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Orientation::Landscape => "landscape",
            Orientation::Portrait => "portrait",
            Orientation::Other => "other",
        }
    }
}

/// Bucket a geometry by aspect ratio.
///
/// Strict inequalities: a ratio of exactly 1.5 or 0.75 falls into `Other`.
pub fn classify(width: u32, height: u32) -> Orientation {
    let ratio = width as f64 / height as f64;
    if ratio > LANDSCAPE_RATIO {
        Orientation::Landscape
    } else if ratio < PORTRAIT_RATIO {
        Orientation::Portrait
    } else {
        Orientation::Other
    }
}

/// Derive the remux output path from the input path.
///
/// The marker goes in front of the extension, so multi-dot stems survive:
/// `a.b.mp4` becomes `a.b.processing.mp4`.
pub fn remux_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    match input.extension() {
        Some(ext) => {
            input.with_file_name(format!("{}.{}.{}", stem, REMUX_MARKER, ext.to_string_lossy()))
        }
        None => input.with_file_name(format!("{}.{}", stem, REMUX_MARKER)),
    }
}

/// ffprobe JSON output, narrowed to the stream fields we ask for.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe and remux operations over a `ToolRunner`.
#[derive(Clone)]
pub struct MediaService {
    runner: Arc<dyn ToolRunner>,
    ffmpeg: String,
    ffprobe: String,
}

impl MediaService {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        ffmpeg: impl Into<String>,
        ffprobe: impl Into<String>,
    ) -> Self {
        Self {
            runner,
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Extract the geometry of the first video stream in a file.
    ///
    /// Fails when the process exits non-zero, reports no video stream, or
    /// omits width/height. All of these abort the calling pipeline.
    pub async fn probe(&self, path: &Path) -> MediaResult<Geometry> {
        let args = vec![
            "-v".to_string(),
            "error".to_string(),
            "-select_streams".to_string(),
            "v:0".to_string(),
            "-show_entries".to_string(),
            "stream=width,height".to_string(),
            "-of".to_string(),
            "json".to_string(),
            path.to_string_lossy().to_string(),
        ];
        let output = self.runner.run(&self.ffprobe, &args).await?;
        if !output.success() {
            return Err(probe_error(path, tool_failure_reason(&output)));
        }

        let parsed: FfprobeOutput = serde_json::from_slice(&output.stdout)
            .map_err(|err| probe_error(path, format!("unparseable output: {}", err)))?;
        let stream = parsed
            .streams
            .first()
            .ok_or_else(|| probe_error(path, "no video streams".to_string()))?;
        match (stream.width, stream.height) {
            (Some(width), Some(height)) => Ok(Geometry { width, height }),
            _ => Err(probe_error(path, "stream missing width or height".to_string())),
        }
    }

    /// Rewrite the container so the stream index sits at the front of the
    /// file, copying audio/video without re-encoding.
    ///
    /// Returns the path of the new artifact. The caller owns deleting it when
    /// the pipeline is abandoned after this step.
    pub async fn remux(&self, input: &Path) -> MediaResult<PathBuf> {
        let output_path = remux_output_path(input);
        let args = vec![
            "-y".to_string(),
            "-v".to_string(),
            "error".to_string(),
            "-i".to_string(),
            input.to_string_lossy().to_string(),
            "-movflags".to_string(),
            "faststart".to_string(),
            "-map_metadata".to_string(),
            "0".to_string(),
            "-codec".to_string(),
            "copy".to_string(),
            "-f".to_string(),
            "mp4".to_string(),
            output_path.to_string_lossy().to_string(),
        ];
        let output = self.runner.run(&self.ffmpeg, &args).await?;
        if !output.success() {
            return Err(MediaError::Remux {
                path: input.display().to_string(),
                reason: tool_failure_reason(&output),
            });
        }
        Ok(output_path)
    }
}

fn probe_error(path: &Path, reason: String) -> MediaError {
    MediaError::Probe {
        path: path.display().to_string(),
        reason,
    }
}

fn tool_failure_reason(output: &ToolOutput) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    match output.exit_code {
        Some(code) if stderr.is_empty() => format!("exit code {}", code),
        Some(code) => format!("exit code {}: {}", code, stderr),
        None => "terminated by signal".to_string(),
    }
}

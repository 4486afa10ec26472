//! Collaborators behind the heavy job stages and their process-backed adapters.

pub mod ffmpeg;
pub mod local;
pub mod process;
pub mod whisperx;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::caption::directive::RenderPlan;
use crate::caption::types::{FaceRegion, Word};

pub use ffmpeg::FfmpegRenderer;
pub use local::{LocalFileFetcher, SourceFetcher};
pub use whisperx::WhisperXTranscriber;
pub use ytdlp::YtDlpFetcher;

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedVideo {
    pub video_path: PathBuf,
    pub duration: Duration,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("invalid video URL: {0}")]
    InvalidUrl(String),
    #[error("video not found: {0}")]
    NotFound(String),
    #[error("rate limited by the video host: {0}")]
    RateLimited(String),
    #[error("unsupported video source: {0}")]
    Unsupported(String),
    #[error("network error while fetching: {0}")]
    Network(String),
    #[error("fetch failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TranscribeError {
    #[error("speech recognition timed out")]
    Timeout,
    #[error("audio track is unusable: {0}")]
    UnsupportedAudio(String),
    #[error("speech engine produced a malformed transcript: {0}")]
    Malformed(String),
    #[error("speech engine failed: {0}")]
    EngineFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("codec not supported: {0}")]
    CodecUnsupported(String),
    #[error("render I/O failure: {0}")]
    Io(String),
    #[error("render timed out")]
    Timeout,
}

/// Downloads a video into a working directory.
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, workdir: &Path) -> Result<FetchedVideo, FetchError>;
}

/// Produces word-level timings for a media file.
#[async_trait::async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, media: &Path, workdir: &Path) -> Result<Vec<Word>, TranscribeError>;
}

/// Burns a render plan into a video.
#[async_trait::async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, video: &Path, plan: &RenderPlan, output: &Path)
    -> Result<(), RenderError>;
}

/// Optional face detection used for caption placement.
#[async_trait::async_trait]
pub trait FaceLocator: Send + Sync {
    async fn locate(&self, video: &Path) -> anyhow::Result<Vec<FaceRegion>>;
}

/// Last non-empty stderr line, used as a failure summary.
pub(crate) fn last_line(stderr: &str) -> String {
    stderr
        .lines()
        .map(str::trim)
        .rfind(|line| !line.is_empty())
        .unwrap_or("no diagnostic output")
        .to_string()
}

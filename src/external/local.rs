use std::path::{Path, PathBuf};

use url::Url;

use super::ffmpeg::probe_duration;
use super::ytdlp::{YtDlpFetcher, sanitize_title};
use super::{FetchError, FetchedVideo, Fetcher};

const COPY_STEM: &str = "source";

/// True for sources that have to be downloaded.
pub fn is_remote(source: &str) -> bool {
    Url::parse(source.trim()).is_ok_and(|url| matches!(url.scheme(), "http" | "https"))
}

/// Resolve a plain path or a `file://` URL to a local path.
pub fn resolve_local_path(source: &str) -> Result<PathBuf, FetchError> {
    let source = source.trim();
    match Url::parse(source) {
        Ok(url) if url.scheme() == "file" => url
            .to_file_path()
            .map_err(|()| FetchError::InvalidUrl(format!("{source}: not a local file URL"))),
        // single-letter schemes are Windows drive letters
        Ok(url) if url.scheme().len() > 1 => Err(FetchError::InvalidUrl(format!(
            "{source}: unsupported scheme '{}'",
            url.scheme()
        ))),
        _ => Ok(PathBuf::from(source)),
    }
}

/// Copies a video already on disk into the job's working directory.
#[derive(Debug, Clone)]
pub struct LocalFileFetcher {
    ffprobe: String,
}

impl LocalFileFetcher {
    pub fn new(ffprobe: impl Into<String>) -> Self {
        Self {
            ffprobe: ffprobe.into(),
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for LocalFileFetcher {
    async fn fetch(&self, source: &str, workdir: &Path) -> Result<FetchedVideo, FetchError> {
        let path = resolve_local_path(source)?;
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|err| FetchError::NotFound(format!("{}: {err}", path.display())))?;
        if !metadata.is_file() {
            return Err(FetchError::Unsupported(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("mp4");
        let video_path = workdir.join(format!("{COPY_STEM}.{extension}"));
        tokio::fs::copy(&path, &video_path).await.map_err(|err| {
            FetchError::Failed(format!("copying {}: {err}", path.display()))
        })?;

        let duration = probe_duration(&self.ffprobe, &video_path)
            .await
            .map_err(|err| FetchError::Failed(format!("{err:#}")))?;
        let title = sanitize_title(
            &path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );

        Ok(FetchedVideo {
            video_path,
            duration,
            title,
        })
    }
}

/// Downloads http(s) sources and copies everything else from disk.
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    remote: YtDlpFetcher,
    local: LocalFileFetcher,
}

impl SourceFetcher {
    pub fn new(remote: YtDlpFetcher, local: LocalFileFetcher) -> Self {
        Self { remote, local }
    }
}

#[async_trait::async_trait]
impl Fetcher for SourceFetcher {
    async fn fetch(&self, source: &str, workdir: &Path) -> Result<FetchedVideo, FetchError> {
        if is_remote(source) {
            self.remote.fetch(source, workdir).await
        } else {
            self.local.fetch(source, workdir).await
        }
    }
}

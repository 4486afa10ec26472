use std::path::{Path, PathBuf};

use duct::cmd;
use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

use super::ffmpeg::probe_duration;
use super::process::run_captured;
use super::{FetchError, FetchedVideo, Fetcher, last_line};

const VIDEO_FORMAT: &str = "bestvideo[ext=mp4][vcodec^=avc1]+bestaudio[ext=m4a]/mp4";
const MAX_TITLE_LEN: usize = 80;
const DOWNLOAD_STEM: &str = "source";

lazy_static! {
    static ref TITLE_JUNK: Regex = Regex::new(r"[^\w\s-]").expect("valid title regex");
    static ref WHITESPACE: Regex = Regex::new(r"\s+").expect("valid whitespace regex");
}

/// Reject anything that is not an absolute http(s) URL with a host.
pub fn validate_url(raw: &str) -> Result<Url, FetchError> {
    let url = Url::parse(raw.trim()).map_err(|err| FetchError::InvalidUrl(format!("{raw}: {err}")))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(FetchError::InvalidUrl(format!(
            "{raw}: unsupported scheme '{}'",
            url.scheme()
        )));
    }
    if url.host_str().is_none_or(str::is_empty) {
        return Err(FetchError::InvalidUrl(format!("{raw}: missing host")));
    }
    Ok(url)
}

/// Turn a video title into a filesystem-safe name.
pub fn sanitize_title(title: &str) -> String {
    let cleaned = TITLE_JUNK.replace_all(title, "");
    let joined = WHITESPACE.replace_all(cleaned.trim(), "_");
    let trimmed = joined.trim_matches('_');
    let name: String = trimmed.chars().take(MAX_TITLE_LEN).collect();
    if name.is_empty() {
        "video".to_string()
    } else {
        name
    }
}

pub fn classify_stderr(stderr: &str) -> FetchError {
    let lower = stderr.to_lowercase();
    let summary = last_line(stderr);
    let any = |markers: &[&str]| markers.iter().any(|m| lower.contains(m));

    if any(&["unsupported url", "no suitable extractor"]) {
        FetchError::Unsupported(summary)
    } else if any(&["http error 429", "too many requests", "rate limit", "rate-limit"]) {
        FetchError::RateLimited(summary)
    } else if any(&[
        "http error 404",
        "video unavailable",
        "private video",
        "has been removed",
        "does not exist",
    ]) {
        FetchError::NotFound(summary)
    } else if any(&[
        "unable to download webpage",
        "connection reset",
        "connection refused",
        "timed out",
        "network is unreachable",
        "temporary failure in name resolution",
        "name or service not known",
    ]) {
        FetchError::Network(summary)
    } else {
        FetchError::Failed(summary)
    }
}

/// Fetches videos with yt-dlp and probes them with ffprobe.
#[derive(Debug, Clone)]
pub struct YtDlpFetcher {
    ytdlp: String,
    ffprobe: String,
}

impl YtDlpFetcher {
    pub fn new(ytdlp: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ytdlp: ytdlp.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn run(&self, args: Vec<String>) -> Result<String, FetchError> {
        let output = run_captured(cmd(self.ytdlp.as_str(), args))
            .await
            .map_err(|err| FetchError::Failed(format!("failed to run {}: {err}", self.ytdlp)))?;
        if output.success {
            Ok(output.stdout)
        } else {
            Err(classify_stderr(&output.stderr))
        }
    }

    async fn find_download(workdir: &Path) -> Result<PathBuf, FetchError> {
        let expected = workdir.join(format!("{DOWNLOAD_STEM}.mp4"));
        if tokio::fs::try_exists(&expected).await.unwrap_or(false) {
            return Ok(expected);
        }

        // yt-dlp picks the container when merging is impossible
        let mut entries = tokio::fs::read_dir(workdir)
            .await
            .map_err(|err| FetchError::Failed(format!("reading {}: {err}", workdir.display())))?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            let is_download = path
                .file_stem()
                .is_some_and(|stem| stem == DOWNLOAD_STEM)
                && path.extension().is_some_and(|ext| ext != "part");
            if is_download {
                return Ok(path);
            }
        }
        Err(FetchError::Failed(
            "yt-dlp reported success but no video file was written".to_string(),
        ))
    }
}

#[async_trait::async_trait]
impl Fetcher for YtDlpFetcher {
    async fn fetch(&self, url: &str, workdir: &Path) -> Result<FetchedVideo, FetchError> {
        let url = validate_url(url)?;

        let raw_title = self
            .run(vec![
                "--no-playlist".to_string(),
                "--get-title".to_string(),
                url.to_string(),
            ])
            .await?;
        let title = sanitize_title(raw_title.lines().next().unwrap_or_default());

        let template = workdir.join(format!("{DOWNLOAD_STEM}.%(ext)s"));
        self.run(vec![
            "--no-playlist".to_string(),
            "--no-progress".to_string(),
            "-f".to_string(),
            VIDEO_FORMAT.to_string(),
            "--merge-output-format".to_string(),
            "mp4".to_string(),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            url.to_string(),
        ])
        .await?;

        let video_path = Self::find_download(workdir).await?;
        let duration = probe_duration(&self.ffprobe, &video_path)
            .await
            .map_err(|err| FetchError::Failed(format!("{err:#}")))?;

        Ok(FetchedVideo {
            video_path,
            duration,
            title,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_must_be_http_with_host() {
        assert!(validate_url("https://www.youtube.com/shorts/abc123").is_ok());
        assert!(matches!(
            validate_url("not a url"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(
            validate_url("ftp://example.com/video.mp4"),
            Err(FetchError::InvalidUrl(_))
        ));
        assert!(matches!(validate_url("file:///etc/passwd"), Err(FetchError::InvalidUrl(_))));
    }

    #[test]
    fn titles_become_safe_file_names() {
        assert_eq!(sanitize_title("How I Built This! (Part 2)"), "How_I_Built_This_Part_2");
        assert_eq!(sanitize_title("  ***  "), "video");
        assert_eq!(sanitize_title("a/b\\c: d"), "abc_d");
    }

    #[test]
    fn stderr_is_classified() {
        assert!(matches!(
            classify_stderr("ERROR: [youtube] abc: HTTP Error 429: Too Many Requests"),
            FetchError::RateLimited(_)
        ));
        assert!(matches!(
            classify_stderr("ERROR: [youtube] abc: Video unavailable"),
            FetchError::NotFound(_)
        ));
        assert!(matches!(
            classify_stderr("ERROR: Unsupported URL: https://example.com"),
            FetchError::Unsupported(_)
        ));
        assert!(matches!(
            classify_stderr("ERROR: Unable to download webpage: <urlopen error timed out>"),
            FetchError::Network(_)
        ));
        assert!(matches!(
            classify_stderr("ERROR: something odd"),
            FetchError::Failed(_)
        ));
    }
}

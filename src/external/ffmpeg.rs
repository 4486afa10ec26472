use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use duct::cmd;

use super::process::run_captured;
use super::{RenderError, Renderer, last_line};
use crate::caption::ass::generate_ass_script;
use crate::caption::directive::RenderPlan;
use crate::ui::prelude::{Level, emit};

/// Fallback canvas when the source cannot be probed (vertical short).
const DEFAULT_PLAY_RES: (u32, u32) = (1080, 1920);

pub async fn probe_duration(ffprobe: &str, path: &Path) -> Result<Duration> {
    let output = run_captured(cmd!(
        ffprobe,
        "-v",
        "error",
        "-show_entries",
        "format=duration",
        "-of",
        "default=noprint_wrappers=1:nokey=1",
        path
    ))
    .await
    .with_context(|| format!("Failed to run ffprobe for {}", path.display()))?;

    if !output.success {
        bail!(
            "ffprobe failed for {}: {}",
            path.display(),
            output.stderr.trim()
        );
    }

    let seconds: f64 = output
        .stdout
        .trim()
        .parse()
        .context("Failed to parse ffprobe duration as f64")?;
    if !seconds.is_finite() || seconds < 0.0 {
        bail!("ffprobe reported an invalid duration: {seconds}");
    }
    Ok(Duration::from_secs_f64(seconds))
}

pub async fn probe_video_dimensions(ffprobe: &str, path: &Path) -> Result<(u32, u32)> {
    let output = run_captured(cmd!(
        ffprobe,
        "-v",
        "error",
        "-select_streams",
        "v:0",
        "-show_entries",
        "stream=width,height",
        "-of",
        "csv=s=x:p=0",
        path
    ))
    .await
    .with_context(|| format!("Failed to probe video dimensions for {}", path.display()))?;

    if !output.success {
        bail!(
            "ffprobe exited with status {:?} while probing {}",
            output.code,
            path.display()
        );
    }

    parse_dimensions(&output.stdout)
}

pub fn parse_dimensions(raw: &str) -> Result<(u32, u32)> {
    let line = raw.lines().next().unwrap_or("").trim();
    let (width, height) = line
        .split_once('x')
        .with_context(|| format!("Unexpected ffprobe dimension output '{line}'"))?;
    let width = width.parse().context("Invalid video width")?;
    let height = height.trim_end_matches('x').parse().context("Invalid video height")?;
    Ok((width, height))
}

/// Escape special characters in a path for use in FFmpeg filter expressions.
fn escape_ffmpeg_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
}

fn classify_stderr(stderr: &str) -> RenderError {
    let lower = stderr.to_lowercase();
    let codec_markers = [
        "unknown encoder",
        "encoder not found",
        "decoder not found",
        "codec not currently supported",
        "invalid data found when processing input",
    ];
    if codec_markers.iter().any(|marker| lower.contains(marker)) {
        RenderError::CodecUnsupported(last_line(stderr))
    } else {
        RenderError::Io(last_line(stderr))
    }
}

/// Burns captions in with the `ass` filter and re-encodes to H.264/AAC.
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    ffmpeg: String,
    ffprobe: String,
}

impl FfmpegRenderer {
    pub fn new(ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    fn build_args(video: &Path, ass_path: &Path, output: &Path) -> Vec<String> {
        let filter = format!("ass='{}',format=yuv420p", escape_ffmpeg_path(ass_path));
        let mut args: Vec<String> = ["-y", "-hide_banner", "-loglevel", "error", "-i"]
            .iter()
            .map(|arg| arg.to_string())
            .collect();
        args.push(video.to_string_lossy().into_owned());
        args.push("-vf".to_string());
        args.push(filter);
        args.extend(
            [
                "-c:v",
                "libx264",
                "-preset",
                "fast",
                "-crf",
                "23",
                "-c:a",
                "aac",
                "-b:a",
                "128k",
                "-movflags",
                "+faststart",
            ]
            .iter()
            .map(|arg| arg.to_string()),
        );
        args.push(output.to_string_lossy().into_owned());
        args
    }
}

#[async_trait::async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(
        &self,
        video: &Path,
        plan: &RenderPlan,
        output: &Path,
    ) -> Result<(), RenderError> {
        let play_res = match probe_video_dimensions(&self.ffprobe, video).await {
            Ok(dims) => dims,
            Err(err) => {
                emit(
                    Level::Warn,
                    "captiongen.render.probe_failed",
                    &format!(
                        "Could not probe {} ({err:#}); assuming {}x{}",
                        video.display(),
                        DEFAULT_PLAY_RES.0,
                        DEFAULT_PLAY_RES.1
                    ),
                    None,
                );
                DEFAULT_PLAY_RES
            }
        };

        let ass_path = output.with_extension("ass");
        tokio::fs::write(&ass_path, generate_ass_script(plan, play_res))
            .await
            .map_err(|err| {
                RenderError::Io(format!("writing {}: {err}", ass_path.display()))
            })?;

        let args = Self::build_args(video, &ass_path, output);
        let result = run_captured(cmd(self.ffmpeg.as_str(), &args))
            .await
            .map_err(|err| RenderError::Io(format!("failed to run {}: {err}", self.ffmpeg)))?;
        if !result.success {
            return Err(classify_stderr(&result.stderr));
        }

        let size = tokio::fs::metadata(output)
            .await
            .map(|meta| meta.len())
            .unwrap_or(0);
        if size == 0 {
            return Err(RenderError::Io(format!(
                "ffmpeg produced no output at {}",
                output.display()
            )));
        }
        Ok(())
    }
}

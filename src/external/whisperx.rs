use std::ffi::OsString;
use std::path::{Path, PathBuf};

use duct::cmd;

use super::process::run_captured;
use super::{TranscribeError, Transcriber, last_line};
use crate::caption::transcript::parse_whisper_json;
use crate::caption::types::Word;
use crate::config::ToolConfig;

/// Runs WhisperX through `uvx` and reads its JSON output.
#[derive(Debug, Clone)]
pub struct WhisperXTranscriber {
    uvx: String,
    model: String,
    device: String,
    compute_type: String,
    language: Option<String>,
}

impl WhisperXTranscriber {
    pub fn from_config(tools: &ToolConfig) -> Self {
        Self {
            uvx: tools.uvx.clone(),
            model: tools.whisper_model.clone(),
            device: tools.whisper_device.clone(),
            compute_type: tools.whisper_compute_type.clone(),
            language: tools.whisper_language.clone(),
        }
    }

    fn build_args(&self, media: &Path, output_dir: &Path) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            OsString::from("whisperx"),
            media.as_os_str().to_os_string(),
            OsString::from("--output_format"),
            OsString::from("json"),
            OsString::from("--output_dir"),
            output_dir.as_os_str().to_os_string(),
            OsString::from("--model"),
            OsString::from(&self.model),
            OsString::from("--device"),
            OsString::from(&self.device),
            OsString::from("--compute_type"),
            OsString::from(&self.compute_type),
        ];
        if let Some(language) = &self.language {
            args.push(OsString::from("--language"));
            args.push(OsString::from(language));
        }
        args
    }

    fn transcript_path(media: &Path, output_dir: &Path) -> PathBuf {
        let stem = media
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        output_dir.join(format!("{stem}.json"))
    }
}

fn classify_stderr(stderr: &str) -> TranscribeError {
    let lower = stderr.to_lowercase();
    let audio_markers = [
        "does not contain any stream",
        "output file #0 does not contain",
        "invalid data found when processing input",
        "no audio",
        "could not find codec",
    ];
    if audio_markers.iter().any(|marker| lower.contains(marker)) {
        TranscribeError::UnsupportedAudio(last_line(stderr))
    } else {
        TranscribeError::EngineFailed(last_line(stderr))
    }
}

#[async_trait::async_trait]
impl Transcriber for WhisperXTranscriber {
    async fn transcribe(&self, media: &Path, workdir: &Path) -> Result<Vec<Word>, TranscribeError> {
        let output_dir = workdir.join("transcript");
        tokio::fs::create_dir_all(&output_dir).await.map_err(|err| {
            TranscribeError::EngineFailed(format!("creating {}: {err}", output_dir.display()))
        })?;

        let result = run_captured(cmd(self.uvx.as_str(), self.build_args(media, &output_dir)))
            .await
            .map_err(|err| TranscribeError::EngineFailed(format!("failed to run {}: {err}", self.uvx)))?;
        if !result.success {
            return Err(classify_stderr(&result.stderr));
        }

        let transcript_path = Self::transcript_path(media, &output_dir);
        let json = tokio::fs::read_to_string(&transcript_path)
            .await
            .map_err(|err| {
                TranscribeError::EngineFailed(format!(
                    "WhisperX did not produce {}: {err}",
                    transcript_path.display()
                ))
            })?;

        parse_whisper_json(&json).map_err(|err| TranscribeError::Malformed(err.to_string()))
    }
}

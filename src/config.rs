use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::caption::ass::CaptionStyle;
use crate::common::paths;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub synthesis: SynthesisConfig,
    pub jobs: JobConfig,
    pub tools: ToolConfig,
    pub style: CaptionStyle,
}

impl AppConfig {
    /// Load the config from `path`, or from the default location when `None`.
    ///
    /// An explicit path must exist; a missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => Self::load_from_path(path)?,
            None => {
                let default_path = config_path()?;
                if default_path.exists() {
                    Self::load_from_path(&default_path)?
                } else {
                    Self::default()
                }
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading captiongen config from {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("parsing captiongen config {}", path.display()))
    }

    pub fn save_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating config directory {}", parent.display()))?;
        }
        fs::write(path, self.to_toml_pretty()?)
            .with_context(|| format!("writing captiongen config to {}", path.display()))?;
        Ok(())
    }

    pub fn to_toml_pretty(&self) -> Result<String> {
        toml::to_string_pretty(self).context("serializing captiongen config")
    }

    pub fn validate(&self) -> Result<()> {
        self.synthesis.validate()?;
        self.jobs.validate()?;
        self.style.validate()
    }
}

/// Upper bound on words per micro-caption.
pub const MAX_CUE_WORDS: usize = 3;

pub fn config_path() -> Result<PathBuf> {
    Ok(paths::captiongen_config_dir()?.join("captiongen.toml"))
}

/// Policy constants for the caption synthesis chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SynthesisConfig {
    /// A gap longer than this between two words forces a cue boundary
    pub pause_threshold_ms: u64,
    /// Maximum words per cue
    pub max_words: usize,
    /// A cue of 2+ words is closed if the next word would stretch it past this span
    pub max_segment_span_ms: u64,
    /// Minimum on-screen time of a reconciled cue
    pub min_cue_ms: u64,
    /// Reconciliation never extends a cue beyond this duration
    pub max_cue_ms: u64,
    /// Gap kept between an extended cue and its successor
    pub guard_gap_ms: u64,
    /// Fade-in/out length at each cue edge
    pub fade_ms: u64,
    /// Filler tokens collapsed when repeated
    pub fillers: Vec<String>,
    /// Words whose casing is kept as recognized
    pub proper_nouns: Vec<String>,
    /// Domain keywords that are always worth highlighting
    pub emphasis_lexicon: Vec<String>,
    /// Words never preferred for emphasis
    pub function_words: Vec<String>,
    /// Minimum score for a word to be highlighted
    pub min_highlight_score: u32,
    /// Draw the highlighted word in the alternate colour
    pub highlight_alt_color: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            pause_threshold_ms: 400,
            max_words: 3,
            max_segment_span_ms: 1_800,
            min_cue_ms: 500,
            max_cue_ms: 3_000,
            guard_gap_ms: 50,
            fade_ms: 80,
            fillers: to_strings(&["um", "uh", "uhm", "er", "erm", "ah", "hmm", "mm"]),
            proper_nouns: to_strings(&["I"]),
            emphasis_lexicon: to_strings(&[
                "ai", "work", "money", "content", "effort", "manual", "shorts", "video", "build",
                "create",
            ]),
            function_words: to_strings(&[
                "a", "an", "the", "and", "or", "but", "nor", "so", "yet", "if", "then", "than",
                "in", "on", "at", "of", "to", "for", "from", "by", "with", "as", "into", "onto",
                "about", "over", "under", "up", "down", "out", "off", "is", "am", "are", "was",
                "were", "be", "been", "being", "do", "does", "did", "have", "has", "had", "will",
                "would", "can", "could", "should", "may", "might", "must", "i", "you", "he",
                "she", "it", "we", "they", "me", "him", "her", "us", "them", "my", "your",
                "his", "its", "our", "their", "this", "that", "these", "those", "there", "here",
                "not", "no", "just", "very", "really", "what", "which", "who", "when", "where",
                "how", "all", "some", "any", "get", "got",
            ]),
            min_highlight_score: 14,
            highlight_alt_color: true,
        }
    }
}

impl SynthesisConfig {
    pub fn pause_threshold(&self) -> Duration {
        Duration::from_millis(self.pause_threshold_ms)
    }

    pub fn max_segment_span(&self) -> Duration {
        Duration::from_millis(self.max_segment_span_ms)
    }

    pub fn min_cue(&self) -> Duration {
        Duration::from_millis(self.min_cue_ms)
    }

    pub fn max_cue(&self) -> Duration {
        Duration::from_millis(self.max_cue_ms)
    }

    pub fn guard_gap(&self) -> Duration {
        Duration::from_millis(self.guard_gap_ms)
    }

    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_CUE_WORDS).contains(&self.max_words) {
            bail!(
                "synthesis.max_words must be between 1 and {MAX_CUE_WORDS} (got {})",
                self.max_words
            );
        }
        if self.min_cue_ms > self.max_cue_ms {
            bail!(
                "synthesis.min_cue_ms ({}) exceeds synthesis.max_cue_ms ({})",
                self.min_cue_ms,
                self.max_cue_ms
            );
        }
        if self.max_segment_span_ms > self.max_cue_ms {
            bail!(
                "synthesis.max_segment_span_ms ({}) exceeds synthesis.max_cue_ms ({})",
                self.max_segment_span_ms,
                self.max_cue_ms
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Heavy jobs allowed in flight at once; further submissions are rejected
    pub max_concurrent_jobs: usize,
    /// Retries per external stage for transient failures
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    pub fetch_timeout_secs: u64,
    pub transcribe_timeout_secs: u64,
    pub render_timeout_secs: u64,
    /// Face location is optional, so it gets a short leash
    pub face_timeout_secs: u64,
    /// How long terminal job records stay queryable
    pub retention_secs: u64,
    /// Where finished videos and subtitles are written
    pub output_dir: Option<PathBuf>,
    /// JSON mirror of the job registry (defaults to `<output_dir>/jobs.json`)
    pub ledger_path: Option<PathBuf>,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            max_retries: 2,
            retry_base_delay_ms: 500,
            retry_max_delay_ms: 8_000,
            fetch_timeout_secs: 900,
            transcribe_timeout_secs: 1_800,
            render_timeout_secs: 1_800,
            face_timeout_secs: 120,
            retention_secs: 3_600,
            output_dir: None,
            ledger_path: None,
        }
    }
}

impl JobConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_jobs == 0 {
            bail!("jobs.max_concurrent_jobs must be at least 1");
        }
        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            bail!("jobs.retry_base_delay_ms exceeds jobs.retry_max_delay_ms");
        }
        Ok(())
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn output_dir(&self) -> Result<PathBuf> {
        match &self.output_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::captiongen_output_dir(),
        }
    }

    pub fn ledger_path(&self) -> Result<PathBuf> {
        match &self.ledger_path {
            Some(path) => Ok(path.clone()),
            None => Ok(self.output_dir()?.join("jobs.json")),
        }
    }
}

/// External tool invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    pub ytdlp: String,
    pub ffmpeg: String,
    pub ffprobe: String,
    pub uvx: String,
    pub whisper_model: String,
    pub whisper_device: String,
    pub whisper_compute_type: String,
    pub whisper_language: Option<String>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            ytdlp: "yt-dlp".to_string(),
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            uvx: "uvx".to_string(),
            whisper_model: "small".to_string(),
            whisper_device: "cpu".to_string(),
            whisper_compute_type: "int8".to_string(),
            whisper_language: None,
        }
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

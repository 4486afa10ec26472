use clap::{Args, Parser, Subcommand, ValueHint};
use std::path::PathBuf;

/// captiongen: micro-caption synthesis and burn-in for short-form video
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file (defaults to <config_dir>/captiongen/captiongen.toml)
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    /// Emit one JSON object per event and JSON command results
    #[arg(long, global = true)]
    pub json: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Activate debug output
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Build micro-captions from a WhisperX JSON transcript
    Caption(CaptionArgs),
    /// Fetch, transcribe, caption and render one or more videos
    Run(RunArgs),
    /// Show a job from the job ledger
    Status(StatusArgs),
    /// Score an SRT file for caption readability
    Validate(ValidateArgs),
    /// Print the default configuration as TOML
    PrintDefaultConfig,
}

#[derive(Args, Debug, Clone)]
pub struct CaptionArgs {
    /// WhisperX JSON transcript
    #[arg(value_hint = ValueHint::FilePath)]
    pub transcript: PathBuf,

    /// Face regions (JSON array of {frame_time, bbox}) for caption placement
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub faces: Option<PathBuf>,

    /// SRT output path; defaults to <transcript>.srt
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub srt: Option<PathBuf>,

    /// Also write an ASS subtitle script
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub ass: Option<PathBuf>,

    /// Also write the render directives as JSON
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub plan: Option<PathBuf>,

    /// Video resolution used for the ASS script, as WIDTHxHEIGHT
    #[arg(long, default_value = "1080x1920")]
    pub resolution: String,

    /// Overwrite existing output files
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Source videos: http(s) URLs, local files or file:// URLs
    #[arg(required = true, value_hint = ValueHint::AnyPath)]
    pub sources: Vec<String>,

    /// Output directory for captioned videos, subtitles and the job ledger
    #[arg(short = 'o', long, value_hint = ValueHint::DirPath)]
    pub output_dir: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Job identifier, as printed by `run`
    pub job_id: String,

    /// Ledger file; defaults to the configured ledger
    #[arg(long, value_hint = ValueHint::FilePath)]
    pub ledger: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct ValidateArgs {
    /// SRT file to check
    #[arg(value_hint = ValueHint::FilePath)]
    pub srt: PathBuf,

    /// Maximum words per cue before it is flagged
    #[arg(long, default_value_t = 6)]
    pub max_words: usize,

    /// Minimum gap in milliseconds between consecutive cues
    #[arg(long, default_value_t = 50)]
    pub min_gap_ms: u64,
}

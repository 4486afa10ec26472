use std::fmt;
use std::time::Duration;

use thiserror::Error;

use super::types::{ErrorKind, JobId, JobState};
use crate::caption::SynthesisError;
use crate::external::{FetchError, RenderError, TranscribeError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job capacity reached ({active}/{limit} jobs active)")]
pub struct CapacityError {
    pub active: usize,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("unknown job {0}")]
    UnknownJob(JobId),
    #[error("job {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: JobId,
        from: JobState,
        to: JobState,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Fetch,
    Transcribe,
    Synthesize,
    Render,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Fetch => "fetch",
            Stage::Transcribe => "transcribe",
            Stage::Synthesize => "synthesize",
            Stage::Render => "render",
        }
    }

    /// Job state while this stage runs.
    pub fn state(self) -> JobState {
        match self {
            Stage::Fetch => JobState::Fetching,
            Stage::Transcribe => JobState::Transcribing,
            Stage::Synthesize => JobState::Synthesizing,
            Stage::Render => JobState::Rendering,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a job stage did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StageError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Transcribe(#[from] TranscribeError),
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error(transparent)]
    Synthesis(#[from] SynthesisError),
    #[error("{stage} stage timed out after {}s", .after.as_secs())]
    TimedOut { stage: Stage, after: Duration },
    #[error("job was cancelled")]
    Cancelled,
    #[error("{0}")]
    Io(String),
}

impl StageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::Fetch(err) => match err {
                FetchError::InvalidUrl(_) => ErrorKind::InvalidUrl,
                FetchError::NotFound(_) => ErrorKind::NotFound,
                FetchError::RateLimited(_) => ErrorKind::RateLimited,
                FetchError::Unsupported(_) => ErrorKind::Unsupported,
                FetchError::Network(_) => ErrorKind::Network,
                FetchError::Failed(_) => ErrorKind::FetchFailed,
            },
            StageError::Transcribe(err) => match err {
                TranscribeError::Timeout => ErrorKind::Timeout,
                TranscribeError::UnsupportedAudio(_) => ErrorKind::UnsupportedAudio,
                TranscribeError::Malformed(_) => ErrorKind::MalformedTranscript,
                TranscribeError::EngineFailed(_) => ErrorKind::EngineFailed,
            },
            StageError::Render(err) => match err {
                RenderError::CodecUnsupported(_) => ErrorKind::CodecUnsupported,
                RenderError::Io(_) => ErrorKind::Io,
                RenderError::Timeout => ErrorKind::Timeout,
            },
            StageError::Synthesis(SynthesisError::Malformed(_)) => ErrorKind::MalformedTranscript,
            StageError::Synthesis(SynthesisError::Contract(_)) => ErrorKind::ContractViolation,
            StageError::TimedOut { .. } => ErrorKind::Timeout,
            StageError::Cancelled => ErrorKind::Cancelled,
            StageError::Io(_) => ErrorKind::Io,
        }
    }

    pub fn is_transient(&self) -> bool {
        self.kind().is_transient()
    }
}

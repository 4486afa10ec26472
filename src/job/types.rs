use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Fetching,
    Transcribing,
    Synthesizing,
    Rendering,
    Done,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    /// The state that follows on success, if any.
    pub fn next(self) -> Option<JobState> {
        match self {
            JobState::Queued => Some(JobState::Fetching),
            JobState::Fetching => Some(JobState::Transcribing),
            JobState::Transcribing => Some(JobState::Synthesizing),
            JobState::Synthesizing => Some(JobState::Rendering),
            JobState::Rendering => Some(JobState::Done),
            JobState::Done | JobState::Failed => None,
        }
    }

    pub fn can_transition_to(self, to: JobState) -> bool {
        if self.is_terminal() {
            return false;
        }
        to == JobState::Failed || self.next() == Some(to)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Fetching => "fetching",
            JobState::Transcribing => "transcribing",
            JobState::Synthesizing => "synthesizing",
            JobState::Rendering => "rendering",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classification recorded on a failed job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidUrl,
    NotFound,
    RateLimited,
    Unsupported,
    Network,
    FetchFailed,
    Timeout,
    UnsupportedAudio,
    MalformedTranscript,
    EngineFailed,
    CodecUnsupported,
    Io,
    ContractViolation,
    Cancelled,
    Internal,
}

impl ErrorKind {
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::Network | ErrorKind::Timeout
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFailure {
    pub kind: ErrorKind,
    /// State the job was in when it failed.
    pub stage: JobState,
    pub summary: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobArtifacts {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtitles: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateChange {
    pub state: JobState,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub source_url: String,
    pub state: JobState,
    #[serde(default)]
    pub artifacts: JobArtifacts,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<StateChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<u32>,
}

impl JobRecord {
    pub fn new(id: JobId, source_url: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            source_url: source_url.into(),
            state: JobState::Queued,
            artifacts: JobArtifacts::default(),
            error: None,
            created_at: now,
            updated_at: now,
            finished_at: None,
            history: vec![StateChange {
                state: JobState::Queued,
                at: now,
            }],
            quality_score: None,
        }
    }

    pub fn states(&self) -> Vec<JobState> {
        self.history.iter().map(|change| change.state).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelOutcome {
    /// The job stops before any heavy work is committed.
    Accepted,
    /// The running stage finishes first; the job fails at the next boundary.
    Deferred,
    AlreadyFinished,
}

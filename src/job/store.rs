use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{CapacityError, StoreError};
use super::types::{
    CancelOutcome, ErrorKind, JobArtifacts, JobFailure, JobId, JobRecord, JobState, StateChange,
};
use crate::ui::prelude::{Level, emit};

struct JobEntry {
    record: JobRecord,
    cancel: Arc<AtomicBool>,
}

#[derive(Default)]
struct StoreInner {
    jobs: HashMap<JobId, JobEntry>,
    active: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Ledger {
    jobs: Vec<JobRecord>,
}

/// Job registry and admission counter.
///
/// Records and the active-slot count live behind one mutex so admission is a
/// single check-and-insert. The lock is never held across an `.await`.
pub struct JobStore {
    inner: Mutex<StoreInner>,
    limit: usize,
    ledger_path: Option<PathBuf>,
}

/// A freshly admitted job.
pub struct Admission {
    pub id: JobId,
    pub cancel: Arc<AtomicBool>,
    pub lease: SlotLease,
}

/// Frees the job's slot if its task ends without reaching a terminal state.
pub struct SlotLease {
    store: Arc<JobStore>,
    id: JobId,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        let abandoned = JobFailure {
            kind: ErrorKind::Internal,
            stage: JobState::Queued,
            summary: "job task ended before reaching a terminal state".to_string(),
        };
        if let Ok(true) = self.store.fail_if_active(&self.id, abandoned) {
            emit(
                Level::Error,
                "captiongen.job.abandoned",
                &format!("Job {} was abandoned by its task", self.id),
                None,
            );
        }
    }
}

impl JobStore {
    pub fn new(limit: usize, ledger_path: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
            limit: limit.max(1),
            ledger_path,
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreInner> {
        // A panic while holding the lock leaves the maps consistent; keep going.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn active_count(&self) -> usize {
        self.lock().active
    }

    /// Create a `Queued` record if a slot is free.
    pub fn admit(self: &Arc<Self>, source_url: &str) -> Result<Admission, CapacityError> {
        let mut inner = self.lock();
        if inner.active >= self.limit {
            return Err(CapacityError {
                active: inner.active,
                limit: self.limit,
            });
        }

        let id = loop {
            let candidate = new_job_id();
            if !inner.jobs.contains_key(&candidate) {
                break candidate;
            }
        };
        let cancel = Arc::new(AtomicBool::new(false));
        inner.jobs.insert(
            id.clone(),
            JobEntry {
                record: JobRecord::new(id.clone(), source_url, Utc::now()),
                cancel: Arc::clone(&cancel),
            },
        );
        inner.active += 1;
        self.persist(&inner);
        drop(inner);

        Ok(Admission {
            id: id.clone(),
            cancel,
            lease: SlotLease {
                store: Arc::clone(self),
                id,
            },
        })
    }

    pub fn get(&self, id: &str) -> Option<JobRecord> {
        self.lock().jobs.get(id).map(|entry| entry.record.clone())
    }

    pub fn list(&self) -> Vec<JobRecord> {
        let mut records: Vec<JobRecord> = self
            .lock()
            .jobs
            .values()
            .map(|entry| entry.record.clone())
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        records
    }

    /// Move a job to the next non-terminal state.
    pub fn advance(&self, id: &str, to: JobState) -> Result<(), StoreError> {
        self.transition(id, to, |_| {})
    }

    pub fn set_title(&self, id: &str, title: &str) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownJob(id.to_string()))?;
        entry.record.artifacts.title = Some(title.to_string());
        Ok(())
    }

    pub fn complete(
        &self,
        id: &str,
        artifacts: JobArtifacts,
        quality_score: Option<u32>,
    ) -> Result<(), StoreError> {
        self.transition(id, JobState::Done, |record| {
            let title = record.artifacts.title.take();
            record.artifacts = JobArtifacts {
                title: artifacts.title.or(title),
                ..artifacts
            };
            record.quality_score = quality_score;
        })
    }

    pub fn fail(&self, id: &str, failure: JobFailure) -> Result<(), StoreError> {
        self.transition(id, JobState::Failed, |record| record.error = Some(failure))
    }

    /// Fail the job unless it already finished. Returns whether it was failed.
    pub fn fail_if_active(&self, id: &str, mut failure: JobFailure) -> Result<bool, StoreError> {
        let state = self
            .get(id)
            .map(|record| record.state)
            .ok_or_else(|| StoreError::UnknownJob(id.to_string()))?;
        if state.is_terminal() {
            return Ok(false);
        }
        failure.stage = state;
        match self.fail(id, failure) {
            Ok(()) => Ok(true),
            Err(StoreError::InvalidTransition { .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }

    fn transition(
        &self,
        id: &str,
        to: JobState,
        update: impl FnOnce(&mut JobRecord),
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        let entry = inner
            .jobs
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownJob(id.to_string()))?;
        let from = entry.record.state;
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition {
                id: id.to_string(),
                from,
                to,
            });
        }

        let now = Utc::now();
        let record = &mut entry.record;
        record.state = to;
        record.updated_at = now;
        record.history.push(StateChange { state: to, at: now });
        if to.is_terminal() {
            record.finished_at = Some(now);
        }
        update(record);

        if to.is_terminal() {
            inner.active = inner.active.saturating_sub(1);
        }
        self.persist(&inner);
        Ok(())
    }

    /// Flag a job for cancellation. The flag is honoured at the next stage
    /// boundary.
    pub fn request_cancel(&self, id: &str) -> Result<CancelOutcome, StoreError> {
        let inner = self.lock();
        let entry = inner
            .jobs
            .get(id)
            .ok_or_else(|| StoreError::UnknownJob(id.to_string()))?;
        let outcome = match entry.record.state {
            JobState::Done | JobState::Failed => return Ok(CancelOutcome::AlreadyFinished),
            JobState::Queued | JobState::Fetching => CancelOutcome::Accepted,
            JobState::Transcribing | JobState::Synthesizing | JobState::Rendering => {
                CancelOutcome::Deferred
            }
        };
        entry.cancel.store(true, Ordering::SeqCst);
        Ok(outcome)
    }

    /// Drop terminal records that finished more than `retention` before `now`.
    pub fn purge_expired(&self, now: DateTime<Utc>, retention: chrono::Duration) -> Vec<JobId> {
        let mut inner = self.lock();
        let expired: Vec<JobId> = inner
            .jobs
            .values()
            .filter(|entry| {
                entry.record.state.is_terminal()
                    && entry
                        .record
                        .finished_at
                        .is_some_and(|finished| now - finished >= retention)
            })
            .map(|entry| entry.record.id.clone())
            .collect();
        for id in &expired {
            inner.jobs.remove(id);
        }
        if !expired.is_empty() {
            self.persist(&inner);
        }
        expired
    }

    /// Load records left in the ledger by earlier runs. Jobs that never
    /// reached a terminal state are recorded as interrupted.
    pub fn restore_ledger(&self) -> Result<usize> {
        let Some(path) = &self.ledger_path else {
            return Ok(0);
        };
        if !path.exists() {
            return Ok(0);
        }
        let records = read_ledger(path)?;
        let mut inner = self.lock();
        let mut restored = 0;
        for mut record in records {
            if inner.jobs.contains_key(&record.id) {
                continue;
            }
            if !record.state.is_terminal() {
                let now = Utc::now();
                record.error = Some(JobFailure {
                    kind: ErrorKind::Internal,
                    stage: record.state,
                    summary: "interrupted before reaching a terminal state".to_string(),
                });
                record.state = JobState::Failed;
                record.updated_at = now;
                record.finished_at = Some(now);
                record.history.push(StateChange {
                    state: JobState::Failed,
                    at: now,
                });
            }
            inner.jobs.insert(
                record.id.clone(),
                JobEntry {
                    record,
                    cancel: Arc::new(AtomicBool::new(false)),
                },
            );
            restored += 1;
        }
        Ok(restored)
    }

    fn persist(&self, inner: &StoreInner) {
        let Some(path) = &self.ledger_path else {
            return;
        };
        let mut jobs: Vec<JobRecord> = inner.jobs.values().map(|e| e.record.clone()).collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        if let Err(err) = write_ledger(path, &Ledger { jobs }) {
            emit(
                Level::Warn,
                "captiongen.ledger.write_failed",
                &format!("Failed to update job ledger {}: {err:#}", path.display()),
                None,
            );
        }
    }
}

fn new_job_id() -> JobId {
    format!("job-{:08x}", rand::random::<u32>())
}

fn write_ledger(path: &Path, ledger: &Ledger) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating ledger directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(ledger).context("serializing job ledger")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("writing {}", tmp.display()))?;
    fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
    Ok(())
}

/// Read job records from a ledger file written by a (possibly finished) run.
pub fn read_ledger(path: &Path) -> Result<Vec<JobRecord>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("reading job ledger {}", path.display()))?;
    let ledger: Ledger = serde_json::from_str(&contents)
        .with_context(|| format!("parsing job ledger {}", path.display()))?;
    Ok(ledger.jobs)
}

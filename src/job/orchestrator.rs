use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;

use super::error::{CapacityError, Stage, StageError, StoreError};
use super::retry::{RetryPolicy, run_stage};
use super::store::{JobStore, SlotLease};
use super::types::{CancelOutcome, ErrorKind, JobArtifacts, JobFailure, JobId, JobRecord, JobState};
use crate::caption::ass::CaptionStyle;
use crate::caption::quality::{QualityThresholds, check_srt};
use crate::caption::types::FaceRegion;
use crate::caption::{SynthesisError, synthesize};
use crate::config::{AppConfig, SynthesisConfig};
use crate::external::{FaceLocator, FetchedVideo, Fetcher, Renderer, Transcriber};
use crate::ui::prelude::{Level, emit};

const SCRATCH_DIR: &str = ".scratch";

/// Tunables for running jobs.
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub synthesis: SynthesisConfig,
    pub style: CaptionStyle,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub transcribe_timeout: Duration,
    pub render_timeout: Duration,
    pub face_timeout: Duration,
    pub output_dir: PathBuf,
    pub retention: Duration,
}

impl OrchestratorSettings {
    pub fn from_config(config: &AppConfig, output_dir: PathBuf) -> Self {
        Self {
            synthesis: config.synthesis.clone(),
            style: config.style.clone(),
            retry: RetryPolicy::from_config(&config.jobs),
            fetch_timeout: Duration::from_secs(config.jobs.fetch_timeout_secs),
            transcribe_timeout: Duration::from_secs(config.jobs.transcribe_timeout_secs),
            render_timeout: Duration::from_secs(config.jobs.render_timeout_secs),
            face_timeout: Duration::from_secs(config.jobs.face_timeout_secs),
            output_dir,
            retention: config.jobs.retention(),
        }
    }
}

/// The external collaborators a job needs.
#[derive(Clone)]
pub struct Collaborators {
    pub fetcher: Arc<dyn Fetcher>,
    pub transcriber: Arc<dyn Transcriber>,
    pub renderer: Arc<dyn Renderer>,
    pub face_locator: Option<Arc<dyn FaceLocator>>,
}

struct Shared {
    store: Arc<JobStore>,
    collaborators: Collaborators,
    settings: OrchestratorSettings,
}

/// Handle to an admitted job's task.
pub struct JobTicket {
    pub id: JobId,
    store: Arc<JobStore>,
    handle: JoinHandle<()>,
}

impl JobTicket {
    /// Wait for the job task to end and return the final record.
    pub async fn wait(self) -> Option<JobRecord> {
        if let Err(err) = self.handle.await {
            emit(
                Level::Error,
                "captiongen.job.task_failed",
                &format!("Job {} task ended abnormally: {err}", self.id),
                None,
            );
        }
        self.store.get(&self.id)
    }
}

/// Admits jobs and drives each through fetch, transcribe, synthesize and render.
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<JobStore>,
        collaborators: Collaborators,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                store,
                collaborators,
                settings,
            }),
        }
    }

    /// Admit a job and start it on its own task. Must be called inside a
    /// tokio runtime.
    pub fn submit(&self, url: &str) -> Result<JobTicket, CapacityError> {
        let admission = self.shared.store.admit(url)?;
        emit(
            Level::Info,
            "captiongen.job.admitted",
            &format!("Job {} queued for {}", admission.id, url),
            Some(json!({ "job": admission.id, "url": url })),
        );

        let run = JobRun {
            shared: Arc::clone(&self.shared),
            id: admission.id.clone(),
            url: url.to_string(),
            cancel: admission.cancel,
        };
        let handle = tokio::spawn(run.run(admission.lease));

        Ok(JobTicket {
            id: admission.id,
            store: Arc::clone(&self.shared.store),
            handle,
        })
    }

    pub fn cancel(&self, id: &str) -> Result<CancelOutcome, StoreError> {
        let outcome = self.shared.store.request_cancel(id)?;
        emit(
            Level::Info,
            "captiongen.job.cancel",
            &format!("Cancellation of job {id}: {outcome:?}"),
            Some(json!({ "job": id, "outcome": outcome })),
        );
        Ok(outcome)
    }

    pub fn status(&self, id: &str) -> Option<JobRecord> {
        self.shared.store.get(id)
    }

    /// Remove terminal records older than the retention window.
    pub fn purge_expired(&self) -> Vec<JobId> {
        let retention = chrono::Duration::from_std(self.shared.settings.retention)
            .unwrap_or(chrono::Duration::MAX);
        let purged = self.shared.store.purge_expired(Utc::now(), retention);
        for id in &purged {
            emit(
                Level::Debug,
                "captiongen.job.purged",
                &format!("Purged expired job {id}"),
                None,
            );
        }
        purged
    }

    /// Periodically purge expired records until the handle is aborted.
    pub fn spawn_retention_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let orchestrator = Orchestrator {
            shared: Arc::clone(&self.shared),
        };
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                orchestrator.purge_expired();
            }
        })
    }
}

struct JobRun {
    shared: Arc<Shared>,
    id: JobId,
    url: String,
    cancel: Arc<AtomicBool>,
}

struct Finished {
    artifacts: JobArtifacts,
    quality_score: Option<u32>,
}

impl JobRun {
    async fn run(self, lease: SlotLease) {
        match self.execute().await {
            Ok(finished) => self.finish(finished),
            Err(err) => self.record_failure(err),
        }
        drop(lease);
    }

    fn finish(&self, finished: Finished) {
        let video = finished.artifacts.video.clone();
        match self.shared.store.complete(&self.id, finished.artifacts, finished.quality_score) {
            Ok(()) => emit(
                Level::Success,
                "captiongen.job.done",
                &format!(
                    "Job {} finished: {}",
                    self.id,
                    video.as_deref().map(Path::display).map(|d| d.to_string()).unwrap_or_default()
                ),
                Some(json!({
                    "job": self.id,
                    "video": video,
                    "quality_score": finished.quality_score,
                })),
            ),
            Err(err) => emit(
                Level::Error,
                "captiongen.job.store_error",
                &format!("Job {} could not be completed: {err}", self.id),
                None,
            ),
        }
    }

    fn record_failure(&self, err: StageError) {
        let kind = err.kind();
        let summary = err.to_string();
        let code = match kind {
            ErrorKind::ContractViolation => "captiongen.job.contract_violation",
            ErrorKind::Cancelled => "captiongen.job.cancelled",
            _ => "captiongen.job.failed",
        };
        let level = if kind == ErrorKind::Cancelled {
            Level::Warn
        } else {
            Level::Error
        };
        emit(
            level,
            code,
            &format!("Job {} failed: {summary}", self.id),
            Some(json!({ "job": self.id, "kind": kind })),
        );

        let failure = JobFailure {
            kind,
            stage: JobState::Queued,
            summary,
        };
        if let Err(err) = self.shared.store.fail_if_active(&self.id, failure) {
            emit(
                Level::Error,
                "captiongen.job.store_error",
                &format!("Job {} could not be marked failed: {err}", self.id),
                None,
            );
        }
    }

    /// Stage boundary: honour a pending cancellation.
    fn checkpoint(&self) -> Result<(), StageError> {
        if self.cancel.load(Ordering::SeqCst) {
            Err(StageError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn enter(&self, stage: Stage) -> Result<(), StageError> {
        self.checkpoint()?;
        let state = stage.state();
        self.shared
            .store
            .advance(&self.id, state)
            .map_err(|err| StageError::Io(err.to_string()))?;
        emit(
            Level::Info,
            "captiongen.job.stage",
            &format!("Job {}: {}", self.id, state),
            Some(json!({ "job": self.id, "state": state })),
        );
        Ok(())
    }

    fn retry_notice(&self, stage: Stage) -> impl FnMut(u32, &StageError, Duration) + '_ {
        move |attempt, err, delay| {
            emit(
                Level::Warn,
                &format!("captiongen.{stage}.retry"),
                &format!(
                    "Job {}: {stage} attempt {} failed ({err}); retrying in {}ms",
                    self.id,
                    attempt,
                    delay.as_millis()
                ),
                Some(json!({ "job": self.id, "attempt": attempt, "kind": err.kind() })),
            );
        }
    }

    async fn execute(&self) -> Result<Finished, StageError> {
        let settings = &self.shared.settings;
        let scratch_root = settings.output_dir.join(SCRATCH_DIR);
        std::fs::create_dir_all(&scratch_root).map_err(|err| {
            StageError::Io(format!("creating {}: {err}", scratch_root.display()))
        })?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{}-", self.id))
            .tempdir_in(&scratch_root)
            .map_err(|err| StageError::Io(format!("creating job scratch directory: {err}")))?;

        self.enter(Stage::Fetch)?;
        let fetched = self.fetch(scratch.path()).await?;
        emit(
            Level::Debug,
            "captiongen.fetch.done",
            &format!(
                "Job {}: fetched '{}' ({:.1}s)",
                self.id,
                fetched.title,
                fetched.duration.as_secs_f64()
            ),
            None,
        );
        if let Err(err) = self.shared.store.set_title(&self.id, &fetched.title) {
            return Err(StageError::Io(err.to_string()));
        }

        self.enter(Stage::Transcribe)?;
        let words = self.transcribe(&fetched.video_path, scratch.path()).await?;

        self.enter(Stage::Synthesize)?;
        let faces = self.locate_faces(&fetched.video_path).await;
        let synthesis = synthesize(&words, faces.as_deref(), &settings.synthesis, &settings.style)
            .map_err(|err| {
                if let SynthesisError::Contract(violation) = &err {
                    emit(
                        Level::Debug,
                        "captiongen.synthesis.contract_detail",
                        &format!("Job {}: {violation}", self.id),
                        None,
                    );
                }
                StageError::from(err)
            })?;
        let quality_score = check_srt(&synthesis.srt, &QualityThresholds::default())
            .ok()
            .map(|report| report.score);

        let srt_path = scratch.path().join("captions.srt");
        tokio::fs::write(&srt_path, &synthesis.srt)
            .await
            .map_err(|err| StageError::Io(format!("writing {}: {err}", srt_path.display())))?;

        self.enter(Stage::Render)?;
        let rendered = self
            .render(&fetched.video_path, &synthesis.plan, scratch.path())
            .await?;

        // A deferred cancellation still discards the finished render.
        self.checkpoint()?;
        let artifacts = self.publish(&fetched.title, &rendered, &srt_path).await?;
        Ok(Finished {
            artifacts,
            quality_score,
        })
    }

    async fn fetch(&self, scratch: &Path) -> Result<FetchedVideo, StageError> {
        let settings = &self.shared.settings;
        let fetcher = Arc::clone(&self.shared.collaborators.fetcher);
        run_stage(
            &settings.retry,
            Stage::Fetch,
            settings.fetch_timeout,
            &self.cancel,
            |attempt| {
                let fetcher = Arc::clone(&fetcher);
                let dir = scratch.join(format!("fetch-{attempt}"));
                let url = self.url.clone();
                async move {
                    create_attempt_dir(&dir).await?;
                    let result = fetcher.fetch(&url, &dir).await.map_err(StageError::from);
                    if result.is_err() {
                        discard_attempt_dir(&dir).await;
                    }
                    result
                }
            },
            self.retry_notice(Stage::Fetch),
        )
        .await
    }

    async fn transcribe(
        &self,
        media: &Path,
        scratch: &Path,
    ) -> Result<Vec<crate::caption::types::Word>, StageError> {
        let settings = &self.shared.settings;
        let transcriber = Arc::clone(&self.shared.collaborators.transcriber);
        run_stage(
            &settings.retry,
            Stage::Transcribe,
            settings.transcribe_timeout,
            &self.cancel,
            |attempt| {
                let transcriber = Arc::clone(&transcriber);
                let dir = scratch.join(format!("transcribe-{attempt}"));
                let media = media.to_path_buf();
                async move {
                    create_attempt_dir(&dir).await?;
                    let result = transcriber
                        .transcribe(&media, &dir)
                        .await
                        .map_err(StageError::from);
                    if result.is_err() {
                        discard_attempt_dir(&dir).await;
                    }
                    result
                }
            },
            self.retry_notice(Stage::Transcribe),
        )
        .await
    }

    async fn render(
        &self,
        video: &Path,
        plan: &crate::caption::directive::RenderPlan,
        scratch: &Path,
    ) -> Result<PathBuf, StageError> {
        let settings = &self.shared.settings;
        let renderer = Arc::clone(&self.shared.collaborators.renderer);
        run_stage(
            &settings.retry,
            Stage::Render,
            settings.render_timeout,
            &self.cancel,
            |attempt| {
                let renderer = Arc::clone(&renderer);
                let dir = scratch.join(format!("render-{attempt}"));
                let video = video.to_path_buf();
                let plan = plan.clone();
                async move {
                    create_attempt_dir(&dir).await?;
                    let output = dir.join("captioned.mp4");
                    match renderer.render(&video, &plan, &output).await {
                        Ok(()) => Ok(output),
                        Err(err) => {
                            discard_attempt_dir(&dir).await;
                            Err(StageError::from(err))
                        }
                    }
                }
            },
            self.retry_notice(Stage::Render),
        )
        .await
    }

    /// Face data is optional; any failure falls back to default placement.
    async fn locate_faces(&self, video: &Path) -> Option<Vec<FaceRegion>> {
        let locator = self.shared.collaborators.face_locator.as_ref()?;
        let timeout = self.shared.settings.face_timeout;
        match tokio::time::timeout(timeout, locator.locate(video)).await {
            Ok(Ok(faces)) => Some(faces),
            Ok(Err(err)) => {
                emit(
                    Level::Warn,
                    "captiongen.faces.failed",
                    &format!("Job {}: face location failed ({err:#}); using default placement", self.id),
                    None,
                );
                None
            }
            Err(_) => {
                emit(
                    Level::Warn,
                    "captiongen.faces.failed",
                    &format!("Job {}: face location timed out; using default placement", self.id),
                    None,
                );
                None
            }
        }
    }

    async fn publish(
        &self,
        title: &str,
        rendered: &Path,
        srt: &Path,
    ) -> Result<JobArtifacts, StageError> {
        let output_dir = &self.shared.settings.output_dir;
        let stem = format!("{title}-{}", self.id);
        let video = output_dir.join("videos").join(format!("{stem}_captioned.mp4"));
        let subtitles = output_dir.join("srt").join(format!("{stem}.srt"));

        move_file(rendered, &video).await?;
        if let Err(err) = move_file(srt, &subtitles).await {
            // Both artifacts or neither.
            let _ = tokio::fs::remove_file(&video).await;
            return Err(err);
        }

        Ok(JobArtifacts {
            title: Some(title.to_string()),
            video: Some(video),
            subtitles: Some(subtitles),
        })
    }
}

async fn create_attempt_dir(dir: &Path) -> Result<(), StageError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|err| StageError::Io(format!("creating {}: {err}", dir.display())))
}

async fn discard_attempt_dir(dir: &Path) {
    let _ = tokio::fs::remove_dir_all(dir).await;
}

/// Rename, falling back to copy and delete across filesystems.
async fn move_file(from: &Path, to: &Path) -> Result<(), StageError> {
    let io_err = |err: std::io::Error| {
        StageError::Io(format!(
            "moving {} to {}: {err}",
            from.display(),
            to.display()
        ))
    };
    if let Some(parent) = to.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(io_err)?;
    }
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to).await.map_err(io_err)?;
    tokio::fs::remove_file(from).await.map_err(io_err)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caption::directive::RenderPlan;
    use crate::caption::types::Word;
    use crate::external::{FetchError, RenderError, TranscribeError};
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicU32;
    use tokio::sync::{Notify, Semaphore};

    #[derive(Default)]
    struct FakeFetcher {
        failures: Mutex<VecDeque<FetchError>>,
        calls: AtomicU32,
        entered: Notify,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait::async_trait]
    impl Fetcher for FakeFetcher {
        async fn fetch(&self, _url: &str, workdir: &Path) -> Result<FetchedVideo, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate open").forget();
            }
            if let Some(err) = self.failures.lock().expect("lock").pop_front() {
                return Err(err);
            }
            let video_path = workdir.join("source.mp4");
            tokio::fs::write(&video_path, b"video").await.expect("write video");
            Ok(FetchedVideo {
                video_path,
                duration: Duration::from_secs(4),
                title: "Demo_Video".to_string(),
            })
        }
    }

    #[derive(Default)]
    struct FakeTranscriber {
        failure: Option<TranscribeError>,
        calls: AtomicU32,
        entered: Notify,
        gate: Option<Arc<Semaphore>>,
    }

    #[async_trait::async_trait]
    impl Transcriber for FakeTranscriber {
        async fn transcribe(
            &self,
            _media: &Path,
            _workdir: &Path,
        ) -> Result<Vec<Word>, TranscribeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.entered.notify_one();
            if let Some(gate) = &self.gate {
                gate.acquire().await.expect("gate open").forget();
            }
            if let Some(err) = &self.failure {
                return Err(err.clone());
            }
            let ms = Duration::from_millis;
            Ok(vec![
                Word::new("we", ms(0), ms(200), 0.9),
                Word::new("build", ms(200), ms(500), 0.9),
                Word::new("things.", ms(500), ms(900), 0.9),
                Word::new("daily", ms(1500), ms(1900), 0.9),
            ])
        }
    }

    #[derive(Default)]
    struct FakeRenderer {
        calls: AtomicU32,
        fail_with: Option<RenderError>,
        hang: bool,
    }

    #[async_trait::async_trait]
    impl Renderer for FakeRenderer {
        async fn render(
            &self,
            _video: &Path,
            plan: &RenderPlan,
            output: &Path,
        ) -> Result<(), RenderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.hang {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if let Some(err) = &self.fail_with {
                return Err(err.clone());
            }
            let body = format!("{} cues", plan.directives.len());
            tokio::fs::write(output, body)
                .await
                .map_err(|err| RenderError::Io(err.to_string()))
        }
    }

    struct BrokenFaceLocator;

    #[async_trait::async_trait]
    impl FaceLocator for BrokenFaceLocator {
        async fn locate(&self, _video: &Path) -> anyhow::Result<Vec<FaceRegion>> {
            anyhow::bail!("no face model available")
        }
    }

    struct StuckFaceLocator;

    #[async_trait::async_trait]
    impl FaceLocator for StuckFaceLocator {
        async fn locate(&self, _video: &Path) -> anyhow::Result<Vec<FaceRegion>> {
            tokio::time::sleep(Duration::from_secs(3_600)).await;
            Ok(Vec::new())
        }
    }

    struct Harness {
        orchestrator: Orchestrator,
        fetcher: Arc<FakeFetcher>,
        transcriber: Arc<FakeTranscriber>,
        renderer: Arc<FakeRenderer>,
        output: tempfile::TempDir,
    }

    fn harness(
        limit: usize,
        fetcher: FakeFetcher,
        transcriber: FakeTranscriber,
        renderer: FakeRenderer,
    ) -> Harness {
        harness_with(limit, fetcher, transcriber, renderer, |_| {})
    }

    fn harness_with(
        limit: usize,
        fetcher: FakeFetcher,
        transcriber: FakeTranscriber,
        renderer: FakeRenderer,
        tweak: impl FnOnce(&mut OrchestratorSettings),
    ) -> Harness {
        let output = tempfile::tempdir().expect("tempdir");
        let fetcher = Arc::new(fetcher);
        let transcriber = Arc::new(transcriber);
        let renderer = Arc::new(renderer);
        let mut config = AppConfig::default();
        config.jobs.retry_base_delay_ms = 1;
        config.jobs.retry_max_delay_ms = 5;
        let mut settings = OrchestratorSettings::from_config(&config, output.path().to_path_buf());
        settings.render_timeout = Duration::from_millis(200);
        tweak(&mut settings);
        let collaborators = Collaborators {
            fetcher: fetcher.clone(),
            transcriber: transcriber.clone(),
            renderer: renderer.clone(),
            face_locator: None,
        };
        let store = Arc::new(JobStore::new(limit, None));
        Harness {
            orchestrator: Orchestrator::new(store, collaborators, settings),
            fetcher,
            transcriber,
            renderer,
            output,
        }
    }

    #[tokio::test]
    async fn job_runs_to_done_and_publishes_artifacts() {
        let h = harness(
            2,
            FakeFetcher::default(),
            FakeTranscriber::default(),
            FakeRenderer::default(),
        );
        let ticket = h.orchestrator.submit("https://example.com/v/1").expect("admit");
        let record = ticket.wait().await.expect("record");

        assert_eq!(record.state, JobState::Done);
        assert_eq!(
            record.states(),
            vec![
                JobState::Queued,
                JobState::Fetching,
                JobState::Transcribing,
                JobState::Synthesizing,
                JobState::Rendering,
                JobState::Done,
            ]
        );
        let video = record.artifacts.video.expect("video path");
        let srt = record.artifacts.subtitles.expect("srt path");
        assert!(video.starts_with(h.output.path().join("videos")));
        assert!(video.to_string_lossy().ends_with("_captioned.mp4"));
        let srt_text = std::fs::read_to_string(&srt).expect("read srt");
        let cues = crate::caption::srt::parse_srt(&srt_text).expect("parse srt");
        assert_eq!(cues[0].text, "We build things.");
        assert!(srt_text.contains("{\\c&H00FFFF&}build{\\c&HFFFFFF&}"));
        assert!(record.quality_score.is_some());
        assert_eq!(h.orchestrator.shared.store.active_count(), 0);
    }

    #[tokio::test]
    async fn face_locator_failure_falls_back_to_default_layout() {
        let mut h = harness(
            1,
            FakeFetcher::default(),
            FakeTranscriber::default(),
            FakeRenderer::default(),
        );
        let shared = Arc::get_mut(&mut h.orchestrator.shared).expect("no jobs yet");
        shared.collaborators.face_locator = Some(Arc::new(BrokenFaceLocator));

        let record = h
            .orchestrator
            .submit("https://example.com/v")
            .expect("admit")
            .wait()
            .await
            .expect("record");
        assert_eq!(record.state, JobState::Done);
    }

    #[tokio::test]
    async fn saturated_pool_rejects_without_record() {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = FakeFetcher {
            gate: Some(gate.clone()),
            ..FakeFetcher::default()
        };
        let h = harness(2, fetcher, FakeTranscriber::default(), FakeRenderer::default());

        let first = h.orchestrator.submit("https://example.com/a").expect("first");
        let second = h.orchestrator.submit("https://example.com/b").expect("second");
        let err = h.orchestrator.submit("https://example.com/c").err().expect("rejected");
        assert_eq!(err.limit, 2);
        assert_eq!(h.orchestrator.shared.store.list().len(), 2);

        gate.add_permits(2);
        assert_eq!(first.wait().await.map(|r| r.state), Some(JobState::Done));
        assert_eq!(second.wait().await.map(|r| r.state), Some(JobState::Done));
        assert!(h.orchestrator.submit("https://example.com/c").is_ok());
    }

    #[tokio::test]
    async fn rate_limited_fetch_is_retried() {
        let fetcher = FakeFetcher {
            failures: Mutex::new(VecDeque::from(vec![
                FetchError::RateLimited("429".into()),
                FetchError::RateLimited("429".into()),
            ])),
            ..FakeFetcher::default()
        };
        let h = harness(1, fetcher, FakeTranscriber::default(), FakeRenderer::default());
        let record = h
            .orchestrator
            .submit("https://example.com/v")
            .expect("admit")
            .wait()
            .await
            .expect("record");

        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 3);
        assert!(record.states().contains(&JobState::Transcribing));
        assert_eq!(record.state, JobState::Done);
    }

    #[tokio::test]
    async fn fatal_fetch_error_fails_immediately() {
        let fetcher = FakeFetcher {
            failures: Mutex::new(VecDeque::from(vec![FetchError::NotFound("gone".into())])),
            ..FakeFetcher::default()
        };
        let h = harness(1, fetcher, FakeTranscriber::default(), FakeRenderer::default());
        let record = h
            .orchestrator
            .submit("https://example.com/v")
            .expect("admit")
            .wait()
            .await
            .expect("record");

        assert_eq!(record.state, JobState::Failed);
        let error = record.error.expect("error");
        assert_eq!(error.kind, ErrorKind::NotFound);
        assert_eq!(error.stage, JobState::Fetching);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn engine_failure_is_not_retried() {
        let transcriber = FakeTranscriber {
            failure: Some(TranscribeError::EngineFailed("crash".into())),
            ..FakeTranscriber::default()
        };
        let h = harness(1, FakeFetcher::default(), transcriber, FakeRenderer::default());
        let record = h
            .orchestrator
            .submit("https://example.com/v")
            .expect("admit")
            .wait()
            .await
            .expect("record");

        assert_eq!(record.error.map(|e| e.kind), Some(ErrorKind::EngineFailed));
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn render_timeout_is_retried_then_fails() {
        let renderer = FakeRenderer {
            hang: true,
            ..FakeRenderer::default()
        };
        let h = harness(1, FakeFetcher::default(), FakeTranscriber::default(), renderer);
        let record = h
            .orchestrator
            .submit("https://example.com/v")
            .expect("admit")
            .wait()
            .await
            .expect("record");

        let error = record.error.expect("error");
        assert_eq!(error.kind, ErrorKind::Timeout);
        assert_eq!(error.stage, JobState::Rendering);
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 3);
        assert!(!h.output.path().join("videos").exists());
    }

    #[tokio::test]
    async fn cancel_during_fetch_is_accepted() {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = FakeFetcher {
            gate: Some(gate.clone()),
            ..FakeFetcher::default()
        };
        let h = harness(1, fetcher, FakeTranscriber::default(), FakeRenderer::default());
        let ticket = h.orchestrator.submit("https://example.com/v").expect("admit");
        h.fetcher.entered.notified().await;

        assert_eq!(h.orchestrator.cancel(&ticket.id), Ok(CancelOutcome::Accepted));
        gate.add_permits(1);
        let record = ticket.wait().await.expect("record");

        let error = record.error.expect("error");
        assert_eq!(error.kind, ErrorKind::Cancelled);
        assert_eq!(error.stage, JobState::Fetching);
        assert_eq!(h.transcriber.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn cancel_during_transcription_is_deferred() {
        let gate = Arc::new(Semaphore::new(0));
        let transcriber = FakeTranscriber {
            gate: Some(gate.clone()),
            ..FakeTranscriber::default()
        };
        let h = harness(1, FakeFetcher::default(), transcriber, FakeRenderer::default());
        let ticket = h.orchestrator.submit("https://example.com/v").expect("admit");
        let id = ticket.id.clone();
        h.transcriber.entered.notified().await;

        assert_eq!(h.orchestrator.cancel(&id), Ok(CancelOutcome::Deferred));
        gate.add_permits(1);
        let record = ticket.wait().await.expect("record");

        assert_eq!(record.error.map(|e| e.kind), Some(ErrorKind::Cancelled));
        assert_eq!(h.renderer.calls.load(Ordering::SeqCst), 0);
        assert!(!h.output.path().join("videos").exists());
        assert_eq!(h.orchestrator.cancel(&id), Ok(CancelOutcome::AlreadyFinished));
    }

    #[tokio::test]
    async fn accepted_cancel_stops_fetch_retries() {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = FakeFetcher {
            failures: Mutex::new(VecDeque::from(vec![FetchError::RateLimited("429".into())])),
            gate: Some(gate.clone()),
            ..FakeFetcher::default()
        };
        let h = harness(1, fetcher, FakeTranscriber::default(), FakeRenderer::default());
        let ticket = h.orchestrator.submit("https://example.com/v").expect("admit");
        h.fetcher.entered.notified().await;

        assert_eq!(h.orchestrator.cancel(&ticket.id), Ok(CancelOutcome::Accepted));
        gate.add_permits(1);
        let record = ticket.wait().await.expect("record");

        let error = record.error.expect("error");
        assert_eq!(error.kind, ErrorKind::Cancelled);
        assert_eq!(error.stage, JobState::Fetching);
        assert_eq!(h.fetcher.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_subtitle_publish_removes_published_video() {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = FakeFetcher {
            gate: Some(gate.clone()),
            ..FakeFetcher::default()
        };
        let h = harness(1, fetcher, FakeTranscriber::default(), FakeRenderer::default());
        let ticket = h.orchestrator.submit("https://example.com/v").expect("admit");
        let id = ticket.id.clone();

        // A directory squatting on the subtitle path makes both rename and copy fail.
        let blocker = h
            .output
            .path()
            .join("srt")
            .join(format!("Demo_Video-{id}.srt"));
        std::fs::create_dir_all(blocker.join("occupied")).expect("create blocker");
        gate.add_permits(1);
        let record = ticket.wait().await.expect("record");

        assert_eq!(record.state, JobState::Failed);
        assert_eq!(record.error.map(|e| e.stage), Some(JobState::Rendering));
        assert!(record.artifacts.video.is_none());
        let video = h
            .output
            .path()
            .join("videos")
            .join(format!("Demo_Video-{id}_captioned.mp4"));
        assert!(!video.exists());
    }

    #[tokio::test]
    async fn slow_face_locator_uses_its_own_timeout() {
        let mut h = harness_with(
            1,
            FakeFetcher::default(),
            FakeTranscriber::default(),
            FakeRenderer::default(),
            |settings| settings.face_timeout = Duration::from_millis(20),
        );
        let shared = Arc::get_mut(&mut h.orchestrator.shared).expect("no jobs yet");
        shared.collaborators.face_locator = Some(Arc::new(StuckFaceLocator));

        let record = tokio::time::timeout(
            Duration::from_secs(5),
            h.orchestrator.submit("https://example.com/v").expect("admit").wait(),
        )
        .await
        .expect("face location should not hold the job")
        .expect("record");
        assert_eq!(record.state, JobState::Done);
    }

    #[tokio::test]
    async fn finished_jobs_are_purged_after_retention() {
        let h = harness_with(
            1,
            FakeFetcher::default(),
            FakeTranscriber::default(),
            FakeRenderer::default(),
            |settings| settings.retention = Duration::ZERO,
        );
        let ticket = h.orchestrator.submit("https://example.com/v").expect("admit");
        let id = ticket.id.clone();
        assert_eq!(ticket.wait().await.map(|r| r.state), Some(JobState::Done));

        assert_eq!(h.orchestrator.purge_expired(), vec![id.clone()]);
        assert!(h.orchestrator.status(&id).is_none());
    }

    #[tokio::test]
    async fn running_jobs_are_never_purged() {
        let gate = Arc::new(Semaphore::new(0));
        let fetcher = FakeFetcher {
            gate: Some(gate.clone()),
            ..FakeFetcher::default()
        };
        let h = harness_with(
            1,
            fetcher,
            FakeTranscriber::default(),
            FakeRenderer::default(),
            |settings| settings.retention = Duration::ZERO,
        );
        let ticket = h.orchestrator.submit("https://example.com/v").expect("admit");
        assert!(h.orchestrator.purge_expired().is_empty());
        gate.add_permits(1);
        assert!(ticket.wait().await.is_some());
    }
}

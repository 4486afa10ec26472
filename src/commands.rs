use anyhow::{Context, Result, bail};
use serde::Serialize;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::caption::ass::generate_ass_script;
use crate::caption::quality::{QualityThresholds, check_srt};
use crate::caption::synthesize;
use crate::caption::transcript::parse_whisper_json;
use crate::caption::types::FaceRegion;
use crate::cli::{CaptionArgs, Commands, RunArgs, StatusArgs, ValidateArgs};
use crate::common::requirements::missing_tools;
use crate::config::AppConfig;
use crate::external::ffmpeg::parse_dimensions;
use crate::external::local::is_remote;
use crate::external::{
    FfmpegRenderer, LocalFileFetcher, SourceFetcher, WhisperXTranscriber, YtDlpFetcher,
};
use crate::job::{
    Collaborators, JobRecord, JobState, JobStore, Orchestrator, OrchestratorSettings, read_ledger,
};
use crate::ui::prelude::*;

const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub async fn dispatch(command: Commands, config_path: Option<&Path>) -> Result<()> {
    match command {
        Commands::PrintDefaultConfig => {
            print!("{}", AppConfig::default().to_toml_pretty()?);
            Ok(())
        }
        Commands::Validate(args) => handle_validate(args),
        Commands::Caption(args) => handle_caption(args, &AppConfig::load(config_path)?),
        Commands::Run(args) => handle_run(args, AppConfig::load(config_path)?).await,
        Commands::Status(args) => handle_status(args, &AppConfig::load(config_path)?),
    }
}

fn ensure_writable(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct CaptionSummary {
    cues: usize,
    words: usize,
    srt: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    ass: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    plan: Option<PathBuf>,
}

fn handle_caption(args: CaptionArgs, config: &AppConfig) -> Result<()> {
    let contents = fs::read_to_string(&args.transcript)
        .with_context(|| format!("reading transcript {}", args.transcript.display()))?;
    let words = parse_whisper_json(&contents)
        .with_context(|| format!("parsing transcript {}", args.transcript.display()))?;

    let faces: Option<Vec<FaceRegion>> = match &args.faces {
        Some(path) => {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("reading face regions {}", path.display()))?;
            Some(
                serde_json::from_str(&raw)
                    .with_context(|| format!("parsing face regions {}", path.display()))?,
            )
        }
        None => None,
    };

    let srt_path = args
        .srt
        .clone()
        .unwrap_or_else(|| args.transcript.with_extension("srt"));
    ensure_writable(&srt_path, args.force)?;
    for path in [&args.ass, &args.plan].into_iter().flatten() {
        ensure_writable(path, args.force)?;
    }
    let play_res = parse_dimensions(&args.resolution)
        .with_context(|| format!("invalid --resolution '{}'", args.resolution))?;

    let synthesis = synthesize(&words, faces.as_deref(), &config.synthesis, &config.style)
        .context("synthesizing captions")?;
    emit(
        Level::Debug,
        "captiongen.caption.synthesized",
        &format!(
            "{} words became {} cues",
            synthesis.word_count(),
            synthesis.cues.len()
        ),
        None,
    );

    fs::write(&srt_path, &synthesis.srt)
        .with_context(|| format!("writing {}", srt_path.display()))?;
    if let Some(path) = &args.ass {
        fs::write(path, generate_ass_script(&synthesis.plan, play_res))
            .with_context(|| format!("writing {}", path.display()))?;
    }
    if let Some(path) = &args.plan {
        let json = synthesis.plan.to_json().context("serializing render plan")?;
        fs::write(path, json).with_context(|| format!("writing {}", path.display()))?;
    }

    let summary = CaptionSummary {
        cues: synthesis.cues.len(),
        words: synthesis.word_count(),
        srt: srt_path,
        ass: args.ass,
        plan: args.plan,
    };
    print_result(&summary, || {
        format!(
            "Wrote {} cues ({} words) to {}",
            summary.cues,
            summary.words,
            summary.srt.display()
        )
    });
    Ok(())
}

fn handle_validate(args: ValidateArgs) -> Result<()> {
    let contents = fs::read_to_string(&args.srt)
        .with_context(|| format!("reading {}", args.srt.display()))?;
    let thresholds = QualityThresholds {
        max_words: args.max_words,
        min_gap: Duration::from_millis(args.min_gap_ms),
    };
    let report = check_srt(&contents, &thresholds)
        .with_context(|| format!("checking {}", args.srt.display()))?;

    print_result(&report, || {
        let mut lines = vec![format!(
            "{}: {} cues, score {}/100",
            args.srt.display(),
            report.total_cues,
            report.score
        )];
        for issue in &report.issues {
            lines.push(format!("  {issue}"));
        }
        lines.join("\n")
    });
    Ok(())
}

#[derive(Serialize)]
struct RunSummary {
    jobs: Vec<JobRecord>,
    rejected: Vec<String>,
}

async fn handle_run(args: RunArgs, config: AppConfig) -> Result<()> {
    let downloads = args.sources.iter().any(|source| is_remote(source));
    let missing = missing_tools(&config.tools, downloads);
    if !missing.is_empty() {
        let names: Vec<String> = missing
            .iter()
            .map(|tool| format!("{} ({})", tool.name, tool.purpose))
            .collect();
        bail!("missing required tools: {}", names.join(", "));
    }

    let (output_dir, ledger) = match &args.output_dir {
        Some(dir) => (dir.clone(), dir.join("jobs.json")),
        None => (config.jobs.output_dir()?, config.jobs.ledger_path()?),
    };
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    let tools = &config.tools;
    let collaborators = Collaborators {
        fetcher: Arc::new(SourceFetcher::new(
            YtDlpFetcher::new(&tools.ytdlp, &tools.ffprobe),
            LocalFileFetcher::new(&tools.ffprobe),
        )),
        transcriber: Arc::new(WhisperXTranscriber::from_config(tools)),
        renderer: Arc::new(FfmpegRenderer::new(&tools.ffmpeg, &tools.ffprobe)),
        face_locator: None,
    };
    let store = Arc::new(JobStore::new(config.jobs.max_concurrent_jobs, Some(ledger)));
    match store.restore_ledger() {
        Ok(restored) if restored > 0 => emit(
            Level::Debug,
            "captiongen.ledger.restored",
            &format!("Restored {restored} earlier job records"),
            None,
        ),
        Ok(_) => {}
        Err(err) => emit(
            Level::Warn,
            "captiongen.ledger.restore_failed",
            &format!("Ignoring unreadable job ledger: {err:#}"),
            None,
        ),
    }
    let orchestrator = Arc::new(Orchestrator::new(
        store,
        collaborators,
        OrchestratorSettings::from_config(&config, output_dir),
    ));
    // The first tick fires immediately and clears records expired since the last run.
    let sweeper = orchestrator.spawn_retention_sweeper(SWEEP_INTERVAL);

    let mut tickets = Vec::new();
    let mut rejected = Vec::new();
    for source in &args.sources {
        let url = absolute_source(source);
        match orchestrator.submit(&url) {
            Ok(ticket) => tickets.push(ticket),
            Err(err) => {
                emit(
                    Level::Warn,
                    "captiongen.job.rejected",
                    &format!("Rejected {url}: {err}"),
                    Some(json!({ "url": url, "active": err.active, "limit": err.limit })),
                );
                rejected.push(url);
            }
        }
    }

    let ids: Vec<String> = tickets.iter().map(|ticket| ticket.id.clone()).collect();
    let interrupt = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                emit(
                    Level::Warn,
                    "captiongen.run.interrupted",
                    "Interrupted; cancelling jobs at the next stage boundary",
                    None,
                );
                for id in &ids {
                    let _ = orchestrator.cancel(id);
                }
            }
        })
    };

    let mut jobs = Vec::new();
    for ticket in tickets {
        if let Some(record) = ticket.wait().await {
            jobs.push(record);
        }
    }
    interrupt.abort();
    sweeper.abort();

    let failed = jobs
        .iter()
        .filter(|job| job.state == JobState::Failed)
        .count();
    let summary = RunSummary { jobs, rejected };
    separator();
    print_result(&summary, || {
        summary
            .jobs
            .iter()
            .map(describe_record)
            .chain(summary.rejected.iter().map(|url| format!("{url}: rejected (capacity)")))
            .collect::<Vec<_>>()
            .join("\n")
    });

    if failed > 0 || !summary.rejected.is_empty() {
        bail!(
            "{} of {} submitted jobs did not complete",
            failed + summary.rejected.len(),
            args.sources.len()
        );
    }
    Ok(())
}

/// Relative paths are pinned to the current directory before jobs start.
fn absolute_source(source: &str) -> String {
    if is_remote(source) || source.starts_with("file:") {
        return source.to_string();
    }
    std::path::absolute(source)
        .map(|path| path.to_string_lossy().into_owned())
        .unwrap_or_else(|_| source.to_string())
}

fn handle_status(args: StatusArgs, config: &AppConfig) -> Result<()> {
    let ledger = match &args.ledger {
        Some(path) => path.clone(),
        None => config.jobs.ledger_path()?,
    };
    let records = read_ledger(&ledger)?;
    let Some(record) = records.into_iter().find(|record| record.id == args.job_id) else {
        bail!("job {} not found in {}", args.job_id, ledger.display());
    };
    print_result(&record, || describe_record(&record));
    Ok(())
}

fn describe_record(record: &JobRecord) -> String {
    let mut line = format!("{} [{}] {}", record.id, record.state, record.source_url);
    match record.state {
        JobState::Done => {
            if let Some(video) = &record.artifacts.video {
                line.push_str(&format!("\n  video: {}", video.display()));
            }
            if let Some(srt) = &record.artifacts.subtitles {
                line.push_str(&format!("\n  subtitles: {}", srt.display()));
            }
            if let Some(score) = record.quality_score {
                line.push_str(&format!("\n  caption quality: {score}/100"));
            }
        }
        JobState::Failed => {
            if let Some(error) = &record.error {
                line.push_str(&format!(
                    "\n  failed while {} ({:?}): {}",
                    error.stage, error.kind, error.summary
                ));
            }
        }
        _ => {}
    }
    line
}

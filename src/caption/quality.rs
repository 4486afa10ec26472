use anyhow::Result;
use serde::Serialize;
use std::fmt;
use std::time::Duration;

use super::srt::{SrtCue, parse_srt};

const PENALTY_PER_ISSUE: u32 = 5;

#[derive(Debug, Clone, Copy)]
pub struct QualityThresholds {
    pub max_words: usize,
    pub min_gap: Duration,
}

impl Default for QualityThresholds {
    fn default() -> Self {
        Self {
            max_words: 6,
            min_gap: Duration::from_millis(50),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum QualityIssue {
    TooManyWords { cue: usize, words: usize },
    /// Negative gaps are overlaps.
    ShortGap { cue: usize, gap_ms: i64 },
}

impl fmt::Display for QualityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QualityIssue::TooManyWords { cue, words } => {
                write!(f, "cue {cue}: {words} words")
            }
            QualityIssue::ShortGap { cue, gap_ms } if *gap_ms < 0 => {
                write!(f, "cue {cue}: overlaps the next cue by {}ms", -gap_ms)
            }
            QualityIssue::ShortGap { cue, gap_ms } => {
                write!(f, "cue {cue}: only {gap_ms}ms before the next cue")
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub total_cues: usize,
    pub issues: Vec<QualityIssue>,
    pub score: u32,
}

/// Score an SRT document for readability.
pub fn check_srt(input: &str, thresholds: &QualityThresholds) -> Result<QualityReport> {
    let cues = parse_srt(input)?;
    Ok(check_cues(&cues, thresholds))
}

pub fn check_cues(cues: &[SrtCue], thresholds: &QualityThresholds) -> QualityReport {
    let mut issues = Vec::new();
    for (i, cue) in cues.iter().enumerate() {
        // 1-based like the SRT index
        let number = i + 1;
        let words = cue.text.split_whitespace().count();
        if words > thresholds.max_words {
            issues.push(QualityIssue::TooManyWords { cue: number, words });
        }
        if let Some(next) = cues.get(i + 1) {
            let gap_ms = next.start.as_millis() as i64 - cue.end.as_millis() as i64;
            if gap_ms < thresholds.min_gap.as_millis() as i64 {
                issues.push(QualityIssue::ShortGap { cue: number, gap_ms });
            }
        }
    }

    let penalty = PENALTY_PER_ISSUE.saturating_mul(issues.len() as u32);
    QualityReport {
        total_cues: cues.len(),
        score: 100u32.saturating_sub(penalty),
        issues,
    }
}

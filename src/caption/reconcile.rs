use std::time::Duration;
use thiserror::Error;

use super::types::Cue;
use crate::config::SynthesisConfig;

/// A reconciled cue sequence broke its ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("timing contract violated at cue {index}: {detail}")]
pub struct ContractViolation {
    pub index: usize,
    pub detail: String,
}

/// Adjust cue end times so cues never overlap, short cues stay on screen
/// long enough to read, and consecutive cues are separated by the guard gap
/// where the earlier cue has room for it. Start times are never moved.
pub fn reconcile(cues: &mut [Cue], config: &SynthesisConfig) -> Result<(), ContractViolation> {
    let guard = config.guard_gap();
    let min = config.min_cue();
    let max = config.max_cue();

    for i in 0..cues.len() {
        let next_start = cues.get(i + 1).map(|next| next.start);
        let cue = &mut cues[i];

        if let Some(next_start) = next_start.filter(|&start| cue.end > start) {
            let backed_off = cue.words_end().max(next_start.saturating_sub(guard));
            cue.end = backed_off.min(next_start);
        }

        if cue.duration() < min {
            let mut target = (cue.start + min).min(cue.start + max);
            if let Some(next_start) = next_start {
                target = target.min(next_start.saturating_sub(guard));
            }
            if target > cue.end {
                cue.end = target;
            }
        }

        // Words running into the guard gap lose at most `guard` of display time.
        if let Some(limit) = next_start.map(|start| start.saturating_sub(guard)) {
            if cue.end > limit && limit > cue.start {
                cue.end = limit;
            }
        }
    }

    check_ordering(cues)
}

/// Verify `start <= end <= next.start` across the whole sequence.
pub fn check_ordering(cues: &[Cue]) -> Result<(), ContractViolation> {
    for (index, cue) in cues.iter().enumerate() {
        if cue.end < cue.start {
            return Err(ContractViolation {
                index,
                detail: format!(
                    "end {} precedes start {}",
                    millis(cue.end),
                    millis(cue.start)
                ),
            });
        }
        if let Some(next) = cues.get(index + 1).filter(|next| cue.end > next.start) {
            return Err(ContractViolation {
                index,
                detail: format!(
                    "end {} overlaps next start {}",
                    millis(cue.end),
                    millis(next.start)
                ),
            });
        }
    }
    Ok(())
}

fn millis(d: Duration) -> String {
    format!("{}ms", d.as_millis())
}

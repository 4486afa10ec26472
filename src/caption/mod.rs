//! Caption synthesis: raw recognizer words in, timed and styled cues out.
//!
//! The chain is pure and deterministic: normalize, segment, reconcile,
//! highlight, lay out, then serialize.

pub mod ass;
pub mod directive;
pub mod highlight;
pub mod layout;
pub mod normalize;
pub mod quality;
pub mod reconcile;
pub mod segment;
pub mod srt;
pub mod transcript;
pub mod types;

use thiserror::Error;

use self::ass::CaptionStyle;
use self::directive::RenderPlan;
use self::normalize::MalformedTranscriptError;
use self::reconcile::ContractViolation;
use self::types::{Cue, FaceRegion, Word};
use crate::config::SynthesisConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error(transparent)]
    Malformed(#[from] MalformedTranscriptError),
    #[error(transparent)]
    Contract(#[from] ContractViolation),
}

/// Everything a job needs to write subtitles and burn captions in.
#[derive(Debug, Clone)]
pub struct Synthesis {
    pub cues: Vec<Cue>,
    pub srt: String,
    pub plan: RenderPlan,
}

impl Synthesis {
    pub fn word_count(&self) -> usize {
        self.cues.iter().map(|cue| cue.words.len()).sum()
    }
}

pub fn synthesize(
    words: &[Word],
    faces: Option<&[FaceRegion]>,
    config: &SynthesisConfig,
    style: &CaptionStyle,
) -> Result<Synthesis, SynthesisError> {
    let normalized = normalize::normalize(words, config)?;
    let mut cues = segment::segment(&normalized, config);
    reconcile::reconcile(&mut cues, config)?;
    highlight::select_highlights(&mut cues, config);
    layout::assign_layout(&mut cues, faces, config);

    let srt = srt::format_srt(&cues, style);
    let plan = RenderPlan {
        directives: directive::build_directives(&cues, style),
        style: style.clone(),
    };
    Ok(Synthesis { cues, srt, plan })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn w(text: &str, start_ms: u64, end_ms: u64) -> Word {
        Word::new(
            text,
            Duration::from_millis(start_ms),
            Duration::from_millis(end_ms),
            0.9,
        )
    }

    fn sample_words() -> Vec<Word> {
        vec![
            w("so", 0, 200),
            w("um", 200, 300),
            w("um", 300, 380),
            w("I", 400, 500),
            w("build", 500, 800),
            w("AI", 800, 1000),
            w("tools,", 1000, 1400),
            w("every", 1450, 1700),
            w("single", 1700, 2000),
            w("day", 2000, 2300),
            w(".", 2300, 2320),
            w("it's", 3500, 3600),
            w("real", 3600, 3900),
            w("work!", 3900, 4300),
        ]
    }

    #[test]
    fn pipeline_produces_ordered_cues() {
        let cfg = SynthesisConfig::default();
        let out = synthesize(&sample_words(), None, &cfg, &CaptionStyle::default())
            .expect("synthesize");

        let texts: Vec<String> = out.cues.iter().map(Cue::text).collect();
        assert_eq!(
            texts,
            vec!["So um I", "build AI tools", "every single day.", "It's real work!"]
        );
        for pair in out.cues.windows(2) {
            assert!(pair[0].end <= pair[1].start);
        }
        // "build" outscores "AI" on length
        assert_eq!(out.cues[1].highlight_index, Some(0));
        assert_eq!(out.plan.directives.len(), out.cues.len());
    }

    #[test]
    fn synthesis_is_deterministic() {
        let cfg = SynthesisConfig::default();
        let style = CaptionStyle::default();
        let a = synthesize(&sample_words(), None, &cfg, &style).expect("first");
        let b = synthesize(&sample_words(), None, &cfg, &style).expect("second");
        assert_eq!(a.srt, b.srt);
        assert_eq!(
            a.plan.to_json().expect("json"),
            b.plan.to_json().expect("json")
        );
    }

    #[test]
    fn words_are_conserved_modulo_fillers_and_punctuation() {
        let cfg = SynthesisConfig::default();
        let words = sample_words();
        let out = synthesize(&words, None, &cfg, &CaptionStyle::default()).expect("synthesize");
        // one repeated filler and one punctuation-only token disappear
        assert_eq!(out.word_count(), words.len() - 2);
    }

    #[test]
    fn back_to_back_words_pass_the_quality_check() {
        let cfg = SynthesisConfig::default();
        let words: Vec<Word> = (0..30u64)
            .map(|i| w("word", i * 300, i * 300 + 300))
            .collect();
        let out = synthesize(&words, None, &cfg, &CaptionStyle::default()).expect("synthesize");
        assert_eq!(out.cues.len(), 10);

        let report = quality::check_srt(&out.srt, &quality::QualityThresholds::default())
            .expect("check");
        assert!(report.issues.is_empty(), "{:?}", report.issues);
        assert_eq!(report.score, 100);
    }

    #[test]
    fn unaligned_segment_becomes_micro_captions() {
        let cfg = SynthesisConfig::default();
        let json = r#"{"segments": [{"start": 0.0, "end": 4.0,
            "text": " we ship small tools that save people real time"}]}"#;
        let words = transcript::parse_whisper_json(json).expect("parse");
        assert_eq!(words.len(), 9);

        let out = synthesize(&words, None, &cfg, &CaptionStyle::default()).expect("synthesize");
        assert!(out.cues.len() >= 3);
        assert!(out.cues.iter().all(|cue| (1..=3).contains(&cue.words.len())));
        assert_eq!(out.word_count(), 9);
    }

    #[test]
    fn malformed_transcript_is_reported() {
        let cfg = SynthesisConfig::default();
        let words = vec![w("ok", 0, 200), w("bad", 300, 250)];
        let err = synthesize(&words, None, &cfg, &CaptionStyle::default()).unwrap_err();
        assert!(matches!(err, SynthesisError::Malformed(ref e) if e.index == 1));
    }

    #[test]
    fn empty_transcript_gives_empty_outputs() {
        let cfg = SynthesisConfig::default();
        let out = synthesize(&[], None, &cfg, &CaptionStyle::default()).expect("synthesize");
        assert!(out.cues.is_empty());
        assert!(out.srt.is_empty());
    }
}

use serde::Deserialize;
use thiserror::Error;

use super::types::{Word, seconds_to_duration};

#[derive(Debug, Error)]
pub enum TranscriptFormatError {
    #[error("transcript is not valid WhisperX JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("word {index} ('{word}') has an invalid timestamp")]
    BadTimestamp { index: usize, word: String },
}

#[derive(Debug, Deserialize)]
struct WhisperOutput {
    segments: Vec<WhisperSegment>,
}

#[derive(Debug, Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    words: Vec<WhisperWord>,
    // Fallback if words are missing (e.g. no alignment)
    #[serde(default)]
    start: f64,
    #[serde(default)]
    end: f64,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct WhisperWord {
    word: String,
    // The aligner leaves numerals and symbols untimed
    #[serde(default)]
    start: Option<f64>,
    #[serde(default)]
    end: Option<f64>,
    #[serde(default)]
    score: Option<f64>,
}

/// Shortest slot an untimed word may take from its timed neighbours.
const MIN_SLOT_SECS: f64 = 0.05;
/// Slot given to a word when the segment carries no usable bounds.
const FALLBACK_SLOT_SECS: f64 = 0.3;

struct Token {
    text: String,
    start: Option<f64>,
    end: Option<f64>,
    score: f64,
}

impl Token {
    fn untimed(text: &str) -> Self {
        Self {
            text: text.to_string(),
            start: None,
            end: None,
            score: 0.0,
        }
    }

    fn is_timed(&self) -> bool {
        self.start.is_some() && self.end.is_some()
    }

    fn start(&self) -> f64 {
        self.start.unwrap_or_default()
    }

    fn end(&self) -> f64 {
        self.end.unwrap_or_default()
    }
}

/// Flatten WhisperX JSON output into a word stream.
///
/// Segments without word alignment are split on whitespace and their span is
/// shared evenly between the words. Untimed words get their own slots
/// interpolated between their timed neighbours.
pub fn parse_whisper_json(json_str: &str) -> Result<Vec<Word>, TranscriptFormatError> {
    let output: WhisperOutput = serde_json::from_str(json_str)?;

    let mut words: Vec<Word> = Vec::new();
    for segment in output.segments {
        let mut tokens: Vec<Token> = if segment.words.is_empty() {
            segment.text.split_whitespace().map(Token::untimed).collect()
        } else {
            segment
                .words
                .into_iter()
                .filter(|raw| !raw.word.trim().is_empty())
                .map(|raw| Token {
                    text: raw.word.trim().to_string(),
                    start: raw.start,
                    end: raw.end,
                    score: raw.score.unwrap_or(0.0),
                })
                .collect()
        };
        if tokens.is_empty() {
            continue;
        }

        let floor = words.last().map_or(0.0, |w| w.end.as_secs_f64());
        fill_untimed(&mut tokens, segment.start.max(floor), segment.end);

        for token in tokens {
            let index = words.len();
            let (Some(start), Some(end)) =
                (seconds_to_duration(token.start()), seconds_to_duration(token.end()))
            else {
                return Err(TranscriptFormatError::BadTimestamp {
                    index,
                    word: token.text,
                });
            };
            words.push(Word::new(token.text, start, end, token.score as f32));
        }
    }

    Ok(words)
}

/// Give every untimed run a span: the gap between its timed neighbours, or,
/// when that gap is too short, the gap plus one neighbour's own span.
fn fill_untimed(tokens: &mut [Token], seg_start: f64, seg_end: f64) {
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].is_timed() {
            i += 1;
            continue;
        }
        let run_start = i;
        while i < tokens.len() && !tokens[i].is_timed() {
            i += 1;
        }
        let run_end = i;
        let count = (run_end - run_start) as f64;
        let left = run_start.checked_sub(1);
        let right = (run_end < tokens.len()).then_some(run_end);

        let lo = left.map_or(seg_start, |l| tokens[l].end());
        let hi = right.map_or_else(
            || {
                if seg_end - lo >= count * MIN_SLOT_SECS {
                    seg_end
                } else {
                    lo + count * FALLBACK_SLOT_SECS
                }
            },
            |r| tokens[r].start(),
        );
        let (from, to, lo, hi) = match (left, right) {
            _ if hi - lo >= count * MIN_SLOT_SECS => (run_start, run_end, lo, hi),
            (Some(l), _) => (l, run_end, tokens[l].start(), hi),
            (None, Some(r)) => (run_start, r + 1, lo.min(tokens[r].start()), tokens[r].end()),
            (None, None) => (run_start, run_end, lo, lo + count * FALLBACK_SLOT_SECS),
        };
        spread(&mut tokens[from..to], lo, hi);
    }
}

fn spread(tokens: &mut [Token], lo: f64, hi: f64) {
    let step = (hi - lo) / tokens.len() as f64;
    for (i, token) in tokens.iter_mut().enumerate() {
        token.start = Some(lo + step * i as f64);
        token.end = Some(lo + step * (i + 1) as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn flattens_segments_into_words() {
        let json = r#"
        {
            "segments": [
                {
                    "start": 0.0,
                    "end": 2.0,
                    "text": "Hello world.",
                    "words": [
                        {"word": "Hello", "start": 0.0, "end": 0.5, "score": 0.9},
                        {"word": "world.", "start": 0.6, "end": 1.0, "score": 0.8}
                    ]
                },
                {
                    "start": 2.5,
                    "end": 4.0,
                    "text": " Next phrase"
                }
            ]
        }
        "#;

        let words = parse_whisper_json(json).expect("parse json");
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["Hello", "world.", "Next", "phrase"]);
        assert_eq!(words[1].end, Duration::from_millis(1000));
        assert!((words[0].confidence - 0.9).abs() < f32::EPSILON);
        assert_eq!(words[2].start, Duration::from_millis(2500));
        assert_eq!(words[2].end, Duration::from_millis(3250));
        assert_eq!(words[3].end, Duration::from_millis(4000));
    }

    #[test]
    fn unaligned_segment_is_split_evenly() {
        let json = r#"{"segments": [{"start": 0, "end": 4, "text": "we build amazing tools"}]}"#;
        let words = parse_whisper_json(json).expect("parse json");
        assert_eq!(words.len(), 4);
        for (i, word) in words.iter().enumerate() {
            assert_eq!(word.start, Duration::from_secs(i as u64));
            assert_eq!(word.end, Duration::from_secs(i as u64 + 1));
        }
    }

    #[test]
    fn untimed_words_get_their_own_slots() {
        let json = r#"
        {
            "segments": [{
                "words": [
                    {"word": "$5"},
                    {"word": "costs", "start": 0.0, "end": 0.4},
                    {"word": "2024", "score": 0.1},
                    {"word": "dollars", "start": 0.9, "end": 1.3}
                ]
            }]
        }
        "#;

        let words = parse_whisper_json(json).expect("parse json");
        let texts: Vec<&str> = words.iter().map(|w| w.text.as_str()).collect();
        assert_eq!(texts, vec!["$5", "costs", "2024", "dollars"]);
        assert_eq!(words[0].end, Duration::from_millis(200));
        assert_eq!(words[1].start, Duration::from_millis(200));
        assert_eq!(words[2].start, Duration::from_millis(400));
        assert_eq!(words[2].end, Duration::from_millis(900));
        assert!(words.iter().all(|w| w.end > w.start));
    }

    #[test]
    fn trailing_untimed_word_without_bounds_gets_a_fallback_slot() {
        let json = r#"{"segments": [{"words": [
            {"word": "total", "start": 1.0, "end": 1.4},
            {"word": "100%"}
        ]}]}"#;
        let words = parse_whisper_json(json).expect("parse json");
        assert_eq!(words.len(), 2);
        assert_eq!(words[1].start, Duration::from_millis(1400));
        assert_eq!(words[1].end, Duration::from_millis(1700));
    }

    #[test]
    fn negative_timestamps_are_rejected() {
        let json = r#"{"segments": [{"words": [{"word": "x", "start": -1.0, "end": 0.5}]}]}"#;
        let err = parse_whisper_json(json).unwrap_err();
        assert!(matches!(err, TranscriptFormatError::BadTimestamp { index: 0, .. }));
    }

    #[test]
    fn invalid_json_is_reported() {
        assert!(matches!(
            parse_whisper_json("not json"),
            Err(TranscriptFormatError::Json(_))
        ));
    }
}

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single recognized word with its timing information.
#[derive(Debug, Clone, PartialEq)]
pub struct Word {
    pub text: String,
    pub start: Duration,
    pub end: Duration,
    /// Recognizer confidence in `[0, 1]`.
    pub confidence: f32,
}

impl Word {
    pub fn new(text: impl Into<String>, start: Duration, end: Duration, confidence: f32) -> Self {
        Self {
            text: text.into(),
            start,
            end,
            confidence: confidence.clamp(0.0, 1.0),
        }
    }

    /// Whether the word carries a sentence-ending mark.
    pub fn ends_sentence(&self) -> bool {
        self.text.ends_with(['.', '!', '?'])
    }
}

/// Convert engine seconds into a millisecond-quantized duration.
///
/// Returns `None` for negative or non-finite input.
pub fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    if !seconds.is_finite() || seconds < 0.0 {
        return None;
    }
    Some(Duration::from_millis((seconds * 1000.0).round() as u64))
}

/// Vertical placement of a cue (numpad alignment in ASS terms).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Position {
    Top,
    Center,
    #[default]
    Bottom,
}

impl Position {
    /// ASS `\an` alignment, horizontally centred.
    pub fn alignment(self) -> u8 {
        match self {
            Position::Bottom => 2,
            Position::Center => 5,
            Position::Top => 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StyleFlags {
    pub fade_in: Duration,
    pub fade_out: Duration,
    /// Highlighted word is drawn in the alternate colour.
    pub alt_color_highlight: bool,
}

/// One on-screen caption unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub words: Vec<Word>,
    pub start: Duration,
    pub end: Duration,
    pub highlight_index: Option<usize>,
    pub position: Position,
    pub style: StyleFlags,
}

impl Cue {
    /// Build a cue bounded by its first and last word.
    ///
    /// `words` must be non-empty.
    pub fn from_words(words: Vec<Word>) -> Self {
        let start = words.first().map(|w| w.start).unwrap_or_default();
        let end = words.last().map(|w| w.end).unwrap_or_default();
        Self {
            words,
            start,
            end,
            highlight_index: None,
            position: Position::default(),
            style: StyleFlags::default(),
        }
    }

    pub fn duration(&self) -> Duration {
        self.end.saturating_sub(self.start)
    }

    pub fn words_end(&self) -> Duration {
        self.words.last().map(|w| w.end).unwrap_or(self.start)
    }

    pub fn text(&self) -> String {
        self.words
            .iter()
            .map(|w| w.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Face detection sample supplied by an optional locator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    /// Sample time in seconds.
    pub frame_time: f64,
    /// `(x, y, w, h)` normalized to `[0, 1]`, origin top-left.
    pub bbox: (f64, f64, f64, f64),
}

impl FaceRegion {
    pub fn center_y(&self) -> f64 {
        self.bbox.1 + self.bbox.3 / 2.0
    }
}

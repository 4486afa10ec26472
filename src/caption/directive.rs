//! Render-filter description handed to the compositor.

use serde::{Deserialize, Serialize};

use super::ass::CaptionStyle;
use super::types::{Cue, Position};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionToken {
    /// Numpad alignment (2 bottom, 5 middle, 8 top).
    pub alignment: u8,
    /// Vertical margin in script pixels before scaling.
    pub margin_v: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HighlightToken {
    pub word_index: usize,
    pub word: String,
}

/// One timed caption line in render order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderDirective {
    pub text: String,
    pub words: Vec<String>,
    pub start_ms: u64,
    pub end_ms: u64,
    pub position: PositionToken,
    pub fade_in_ms: u64,
    pub fade_out_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<HighlightToken>,
}

/// Directives plus the style they are drawn with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderPlan {
    pub directives: Vec<RenderDirective>,
    pub style: CaptionStyle,
}

impl RenderPlan {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

pub fn position_token(position: Position, style: &CaptionStyle) -> PositionToken {
    PositionToken {
        alignment: position.alignment(),
        margin_v: style.margin_v(position),
    }
}

pub fn build_directives(cues: &[Cue], style: &CaptionStyle) -> Vec<RenderDirective> {
    cues.iter()
        .map(|cue| {
            let words: Vec<String> = cue.words.iter().map(|w| w.text.clone()).collect();
            let highlight = cue
                .highlight_index
                .filter(|_| cue.style.alt_color_highlight)
                .and_then(|index| {
                    words.get(index).map(|word| HighlightToken {
                        word_index: index,
                        word: word.clone(),
                    })
                });
            RenderDirective {
                text: words.join(" "),
                words,
                start_ms: cue.start.as_millis() as u64,
                end_ms: cue.end.as_millis() as u64,
                position: position_token(cue.position, style),
                fade_in_ms: cue.style.fade_in.as_millis() as u64,
                fade_out_ms: cue.style.fade_out.as_millis() as u64,
                highlight,
            }
        })
        .collect()
}

//! ASS (Advanced SubStation Alpha) script generation.
//!
//! Builds the burn-in script consumed by FFmpeg's `ass` filter from a render
//! plan.

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::directive::{RenderDirective, RenderPlan};
use super::types::Position;

/// Libass renders SRT input against a 288-line canvas; style sizes are
/// expressed on that canvas and scaled to the output height.
pub const REFERENCE_HEIGHT: u32 = 288;

/// Style configuration for burned-in captions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptionStyle {
    /// Font name
    pub font_name: String,
    /// Font size on the reference canvas
    pub font_size: u32,
    /// Text color in ASS style format (&HAABBGGRR)
    pub primary_color: String,
    /// Color of the emphasised word
    pub highlight_color: String,
    /// Outline color
    pub outline_color: String,
    /// Background/shadow color
    pub back_color: String,
    pub bold: bool,
    /// Outline width in pixels
    pub outline: u32,
    /// Shadow depth in pixels
    pub shadow: u32,
    pub margin_l: u32,
    pub margin_r: u32,
    /// Vertical margin per placement
    pub margin_v_bottom: u32,
    pub margin_v_center: u32,
    pub margin_v_top: u32,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_name: "Arial Black".to_string(),
            font_size: 20,
            primary_color: "&H00FFFFFF".to_string(),
            // yellow
            highlight_color: "&H0000FFFF".to_string(),
            outline_color: "&H00000000".to_string(),
            // semi-transparent black box
            back_color: "&H80000000".to_string(),
            bold: true,
            outline: 1,
            shadow: 2,
            margin_l: 20,
            margin_r: 20,
            margin_v_bottom: 100,
            margin_v_center: 20,
            margin_v_top: 150,
        }
    }
}

impl CaptionStyle {
    /// Reject colours that are not `&H` followed by 6 or 8 hex digits.
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("primary_color", &self.primary_color),
            ("highlight_color", &self.highlight_color),
            ("outline_color", &self.outline_color),
            ("back_color", &self.back_color),
        ] {
            if !is_ass_color(value) {
                bail!("style.{field} '{value}' is not an ASS colour like &H00FFFFFF");
            }
        }
        Ok(())
    }

    pub fn margin_v(&self, position: Position) -> u32 {
        match position {
            Position::Bottom => self.margin_v_bottom,
            Position::Center => self.margin_v_center,
            Position::Top => self.margin_v_top,
        }
    }

    /// Inline `\c` override switching to the highlight colour.
    pub fn highlight_tag(&self) -> String {
        format!("{{\\c{}}}", inline_color(&self.highlight_color))
    }

    /// Inline `\c` override returning to the text colour.
    pub fn reset_tag(&self) -> String {
        format!("{{\\c{}}}", inline_color(&self.primary_color))
    }

    /// Format the style line for the ASS file at the given canvas height.
    fn to_style_line(&self, play_res_y: u32) -> String {
        let bold_val = if self.bold { -1 } else { 0 };
        format!(
            "Style: Default,{font},{size},{primary},{secondary},{outline},{back},{bold},0,0,0,100,100,0,0,1,{outline_w},{shadow},2,{ml},{mr},{mv},1",
            font = self.font_name,
            size = scale(self.font_size, play_res_y),
            primary = self.primary_color,
            secondary = self.highlight_color,
            outline = self.outline_color,
            back = self.back_color,
            bold = bold_val,
            outline_w = scale(self.outline, play_res_y),
            shadow = scale(self.shadow, play_res_y),
            ml = scale(self.margin_l, play_res_y),
            mr = scale(self.margin_r, play_res_y),
            mv = scale(self.margin_v_bottom, play_res_y),
        )
    }
}

fn is_ass_color(value: &str) -> bool {
    let hex = value.strip_prefix("&H").unwrap_or_default();
    let hex = hex.strip_suffix('&').unwrap_or(hex);
    matches!(hex.len(), 6 | 8) && hex.chars().all(|c| c.is_ascii_hexdigit())
}

/// `&H00BBGGRR` style colour to the `&HBBGGRR&` inline form.
fn inline_color(style_color: &str) -> String {
    let hex = style_color.trim_start_matches("&H").trim_end_matches('&');
    let skip = hex.chars().count().saturating_sub(6);
    let bgr: String = hex.chars().skip(skip).collect();
    format!("&H{bgr}&")
}

fn scale(value: u32, play_res_y: u32) -> u32 {
    let scaled = u64::from(value) * u64::from(play_res_y) / u64::from(REFERENCE_HEIGHT);
    scaled as u32
}

/// Generate the complete ASS script for a render plan.
///
/// `play_res` must match the output video so that sizes map to pixels.
pub fn generate_ass_script(plan: &RenderPlan, play_res: (u32, u32)) -> String {
    let style = &plan.style;
    let mut lines = vec![
        "[Script Info]".to_string(),
        "; Generated by captiongen".to_string(),
        "ScriptType: v4.00+".to_string(),
        format!("PlayResX: {}", play_res.0),
        format!("PlayResY: {}", play_res.1),
        "WrapStyle: 2".to_string(),
        "ScaledBorderAndShadow: yes".to_string(),
        String::new(),
        "[V4+ Styles]".to_string(),
        "Format: Name, Fontname, Fontsize, PrimaryColour, SecondaryColour, OutlineColour, BackColour, Bold, Italic, Underline, StrikeOut, ScaleX, ScaleY, Spacing, Angle, BorderStyle, Outline, Shadow, Alignment, MarginL, MarginR, MarginV, Encoding".to_string(),
        style.to_style_line(play_res.1),
        String::new(),
        "[Events]".to_string(),
        "Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text".to_string(),
    ];

    for directive in &plan.directives {
        lines.push(dialogue_line(directive, style, play_res.1));
    }

    let mut output = lines.join("\n");
    output.push('\n');
    output
}

fn dialogue_line(directive: &RenderDirective, style: &CaptionStyle, play_res_y: u32) -> String {
    let start = format_ass_timestamp(Duration::from_millis(directive.start_ms));
    let end = format_ass_timestamp(Duration::from_millis(directive.end_ms));
    format!(
        "Dialogue: 0,{start},{end},Default,,0,0,{margin},,{{\\an{align}\\fad({fade_in},{fade_out})}}{text}",
        margin = scale(directive.position.margin_v, play_res_y),
        align = directive.position.alignment,
        fade_in = directive.fade_in_ms,
        fade_out = directive.fade_out_ms,
        text = directive_text(directive, style),
    )
}

fn directive_text(directive: &RenderDirective, style: &CaptionStyle) -> String {
    let highlighted = directive.highlight.as_ref().map(|h| h.word_index);
    directive
        .words
        .iter()
        .enumerate()
        .map(|(index, word)| {
            let escaped = escape_ass_text(word);
            if Some(index) == highlighted {
                format!("{}{}{}", style.highlight_tag(), escaped, style.reset_tag())
            } else {
                escaped
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Format a Duration as an ASS timestamp (H:MM:SS.cc).
fn format_ass_timestamp(duration: Duration) -> String {
    let total_cs = (duration.as_millis() + 5) / 10;
    let hours = total_cs / 360_000;
    let minutes = (total_cs % 360_000) / 6_000;
    let seconds = (total_cs % 6_000) / 100;
    let centiseconds = total_cs % 100;
    format!("{hours}:{minutes:02}:{seconds:02}.{centiseconds:02}")
}

/// Escape special characters in ASS text.
fn escape_ass_text(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('{', "\\{")
        .replace('}', "\\}")
        .replace('\n', "\\N")
}

use anyhow::{Context, Result, bail};
use lazy_static::lazy_static;
use regex::Regex;
use std::time::Duration;

use super::ass::CaptionStyle;
use super::types::Cue;

lazy_static! {
    static ref OVERRIDE_TAG: Regex = Regex::new(r"\{\\[^}]*\}").expect("valid override tag regex");
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrtCue {
    pub start: Duration,
    pub end: Duration,
    pub text: String,
}

/// Render cues as an SRT document, wrapping the emphasis word in colour tags.
pub fn format_srt(cues: &[Cue], style: &CaptionStyle) -> String {
    let mut output = String::new();
    for (i, cue) in cues.iter().enumerate() {
        output.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(cue.start),
            format_timestamp(cue.end),
            cue_markup(cue, style)
        ));
    }
    output
}

fn cue_markup(cue: &Cue, style: &CaptionStyle) -> String {
    let highlighted = cue.highlight_index.filter(|_| cue.style.alt_color_highlight);
    cue.words
        .iter()
        .enumerate()
        .map(|(index, word)| {
            if Some(index) == highlighted {
                format!("{}{}{}", style.highlight_tag(), word.text, style.reset_tag())
            } else {
                word.text.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// `HH:MM:SS,mmm`
pub fn format_timestamp(duration: Duration) -> String {
    let total_ms = duration.as_millis();
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms % 3_600_000) / 60_000;
    let seconds = (total_ms % 60_000) / 1_000;
    let millis = total_ms % 1_000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

pub fn strip_override_tags(text: &str) -> String {
    OVERRIDE_TAG.replace_all(text, "").into_owned()
}

/// Parse an SRT document; override tags are removed from the cue text.
pub fn parse_srt(input: &str) -> Result<Vec<SrtCue>> {
    let mut cues = Vec::new();
    let mut lines = input.lines().peekable();

    while let Some(line) = lines.next() {
        let index_line = line.trim().trim_start_matches('\u{feff}');
        if index_line.is_empty() {
            continue;
        }

        // Some writers omit the index; the line is then the timing line itself
        let times = if index_line.contains("-->") {
            index_line
        } else {
            lines
                .next()
                .map(str::trim)
                .context("SRT cue is missing a timestamp line")?
        };

        let (start_raw, end_raw) = times
            .split_once("-->")
            .map(|(a, b)| (a.trim(), b.trim()))
            .context("SRT cue timestamp line must contain '-->'")?;

        let start = parse_timestamp(start_raw)
            .with_context(|| format!("Failed to parse SRT start timestamp '{start_raw}'"))?;
        let end = parse_timestamp(end_raw)
            .with_context(|| format!("Failed to parse SRT end timestamp '{end_raw}'"))?;

        if end < start {
            bail!("SRT cue ends before it starts: {start_raw} --> {end_raw}");
        }

        let mut text_lines = Vec::new();
        while let Some(next) = lines.next_if(|next| !next.trim().is_empty()) {
            text_lines.push(strip_override_tags(next.trim()));
        }

        cues.push(SrtCue {
            start,
            end,
            text: text_lines.join(" "),
        });
    }

    cues.sort_by_key(|cue| cue.start);
    Ok(cues)
}

fn parse_timestamp(value: &str) -> Result<Duration> {
    let cleaned = value.trim().replace(',', ".");
    let (time_part, fractional_part) = cleaned.split_once('.').unwrap_or((cleaned.as_str(), "0"));

    let mut hms = time_part.split(':');
    let hours = hms
        .next()
        .context("Timestamp missing hours")?
        .parse::<u64>()
        .context("Invalid hours in timestamp")?;
    let minutes = hms
        .next()
        .context("Timestamp missing minutes")?
        .parse::<u64>()
        .context("Invalid minutes in timestamp")?;
    let seconds = hms
        .next()
        .context("Timestamp missing seconds")?
        .parse::<u64>()
        .context("Invalid seconds in timestamp")?;

    if hms.next().is_some() {
        bail!("Timestamp has more than three components: {value}");
    }

    let mut millis_str: String = fractional_part.chars().take(3).collect();
    while millis_str.len() < 3 {
        millis_str.push('0');
    }
    let millis = millis_str
        .parse::<u64>()
        .context("Invalid millisecond component in timestamp")?;

    let total_seconds = hours * 3600 + minutes * 60 + seconds;
    Ok(Duration::from_secs(total_seconds) + Duration::from_millis(millis))
}

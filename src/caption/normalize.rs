//! Transcript cleanup applied before segmentation.
//!
//! Validates word timing, strips stray punctuation, collapses repeated fillers
//! and fixes casing so that every downstream stage sees tidy words.

use thiserror::Error;

use super::types::Word;
use crate::config::SynthesisConfig;

const TERMINAL_MARKS: [char; 3] = ['.', '!', '?'];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("malformed transcript at word {index}: {reason}")]
pub struct MalformedTranscriptError {
    pub index: usize,
    pub reason: String,
}

/// Normalize a raw recognizer word stream.
///
/// Fails on the first word whose timing is inconsistent; no partial output is
/// produced in that case.
pub fn normalize(
    words: &[Word],
    config: &SynthesisConfig,
) -> Result<Vec<Word>, MalformedTranscriptError> {
    validate(words)?;

    let mut out: Vec<Word> = Vec::with_capacity(words.len());
    for word in words {
        let (core, mark) = split_punctuation(&word.text);

        if core.is_empty() {
            if let (Some(mark), Some(prev)) = (mark, out.last_mut()) {
                set_terminal_mark(prev, mark);
            }
            continue;
        }

        let repeated_filler = is_filler(core, config)
            && out
                .last()
                .is_some_and(|prev| bare(&prev.text).eq_ignore_ascii_case(core));
        if repeated_filler {
            if let (Some(mark), Some(prev)) = (mark, out.last_mut()) {
                set_terminal_mark(prev, mark);
            }
            continue;
        }

        let mut text = core.to_string();
        if let Some(mark) = mark {
            text.push(mark);
        }
        out.push(Word {
            text,
            ..word.clone()
        });
    }

    apply_casing(&mut out, config);
    Ok(out)
}

fn validate(words: &[Word]) -> Result<(), MalformedTranscriptError> {
    for (index, word) in words.iter().enumerate() {
        if word.end <= word.start {
            return Err(MalformedTranscriptError {
                index,
                reason: format!(
                    "end {}ms is not after start {}ms",
                    word.end.as_millis(),
                    word.start.as_millis()
                ),
            });
        }
        if index > 0 && word.start < words[index - 1].start {
            return Err(MalformedTranscriptError {
                index,
                reason: format!(
                    "start {}ms precedes previous word start {}ms",
                    word.start.as_millis(),
                    words[index - 1].start.as_millis()
                ),
            });
        }
    }
    Ok(())
}

/// Split a token into its alphanumeric core and the sentence mark found in its
/// trailing punctuation, if any.
fn split_punctuation(text: &str) -> (&str, Option<char>) {
    let trimmed = text.trim();
    let core = trimmed.trim_matches(|c: char| !c.is_alphanumeric());
    if core.is_empty() {
        let mark = trimmed.chars().find(|c| TERMINAL_MARKS.contains(c));
        return ("", mark);
    }
    let core_end = trimmed
        .trim_end_matches(|c: char| !c.is_alphanumeric())
        .len();
    let tail = &trimmed[core_end..];
    let mark = tail.chars().find(|c| TERMINAL_MARKS.contains(c));
    (core, mark)
}

fn bare(text: &str) -> &str {
    text.trim_end_matches(TERMINAL_MARKS)
}

fn set_terminal_mark(word: &mut Word, mark: char) {
    let len = bare(&word.text).len();
    word.text.truncate(len);
    word.text.push(mark);
}

fn is_filler(core: &str, config: &SynthesisConfig) -> bool {
    config
        .fillers
        .iter()
        .any(|filler| filler.eq_ignore_ascii_case(core))
}

fn apply_casing(words: &mut [Word], config: &SynthesisConfig) {
    let mut sentence_start = true;
    for word in words.iter_mut() {
        let ends_sentence = word.ends_sentence();
        let core_len = bare(&word.text).len();
        let (core, mark) = word.text.split_at(core_len);
        let cased = case_word(core, sentence_start, config);
        word.text = format!("{cased}{mark}");
        sentence_start = ends_sentence;
    }
}

fn case_word(core: &str, sentence_start: bool, config: &SynthesisConfig) -> String {
    if is_acronym(core) {
        return core.to_string();
    }

    let (head, rest) = match core.find('\'') {
        Some(pos) => core.split_at(pos),
        None => (core, ""),
    };
    if let Some(noun) = config
        .proper_nouns
        .iter()
        .find(|noun| noun.eq_ignore_ascii_case(head))
    {
        return format!("{noun}{}", rest.to_lowercase());
    }

    if sentence_start {
        let mut chars = core.chars();
        match chars.next() {
            Some(first) => first
                .to_uppercase()
                .chain(chars.flat_map(char::to_lowercase))
                .collect(),
            None => String::new(),
        }
    } else {
        core.to_lowercase()
    }
}

fn is_acronym(core: &str) -> bool {
    let letters: Vec<char> = core.chars().filter(|c| c.is_alphabetic()).collect();
    letters.len() >= 2 && letters.iter().all(|c| c.is_uppercase())
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

    fn texts(words: &[Word]) -> Vec<&str> {
        words.iter().map(|w| w.text.as_str()).collect()
    }

    #[test]
    fn strips_outer_punctuation_and_keeps_terminal_mark() {
        let cfg = SynthesisConfig::default();
        let words = vec![
            w("\"hello,", 0, 300),
            w("don't", 300, 500),
            w("well-known...", 500, 800),
            w("really?!", 900, 1200),
        ];
        let out = normalize(&words, &cfg).expect("normalize");
        assert_eq!(texts(&out), vec!["Hello", "don't", "well-known.", "Really?"]);
    }

    #[test]
    fn punctuation_only_token_moves_mark_to_previous_word() {
        let cfg = SynthesisConfig::default();
        let words = vec![w("stop", 0, 300), w("!", 300, 350), w("go", 400, 600)];
        let out = normalize(&words, &cfg).expect("normalize");
        assert_eq!(texts(&out), vec!["Stop!", "Go"]);
    }

    #[test]
    fn repeated_fillers_collapse_to_first_occurrence() {
        let cfg = SynthesisConfig::default();
        let words = vec![
            w("so", 0, 200),
            w("um", 200, 300),
            w("Um", 300, 400),
            w("um.", 400, 500),
            w("right", 600, 800),
        ];
        let out = normalize(&words, &cfg).expect("normalize");
        assert_eq!(texts(&out), vec!["So", "um.", "Right"]);
        assert_eq!(out[1].start, Duration::from_millis(200));
        assert_eq!(out[1].end, Duration::from_millis(300));
    }

    #[test]
    fn repeated_content_words_are_kept() {
        let cfg = SynthesisConfig::default();
        let words = vec![w("very", 0, 200), w("very", 200, 400)];
        let out = normalize(&words, &cfg).expect("normalize");
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn casing_respects_proper_nouns_and_acronyms() {
        let cfg = SynthesisConfig::default();
        let words = vec![
            w("WELL", 0, 200),
            w("i'm", 200, 400),
            w("using", 400, 600),
            w("AI", 600, 800),
            w("TODAY.", 800, 1000),
            w("i", 1100, 1200),
        ];
        let out = normalize(&words, &cfg).expect("normalize");
        assert_eq!(texts(&out), vec!["WELL", "I'm", "using", "AI", "TODAY.", "I"]);
    }

    #[test]
    fn sentence_start_is_capitalized() {
        let cfg = SynthesisConfig::default();
        let words = vec![w("one.", 0, 200), w("Two", 200, 400), w("Three", 400, 600)];
        let out = normalize(&words, &cfg).expect("normalize");
        assert_eq!(texts(&out), vec!["One.", "Two", "three"]);
    }

    #[test]
    fn rejects_inverted_word() {
        let cfg = SynthesisConfig::default();
        let words = vec![w("fine", 0, 200), w("broken", 500, 500)];
        let err = normalize(&words, &cfg).unwrap_err();
        assert_eq!(err.index, 1);
    }

    #[test]
    fn rejects_out_of_order_start() {
        let cfg = SynthesisConfig::default();
        let words = vec![w("first", 500, 700), w("second", 400, 800)];
        let err = normalize(&words, &cfg).unwrap_err();
        assert_eq!(err.index, 1);
        assert!(err.reason.contains("precedes"));
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let cfg = SynthesisConfig::default();
        let words = vec![w("hey,", 0, 200), w("uh", 200, 300), w("uh", 300, 400), w("AI!", 400, 600)];
        let once = normalize(&words, &cfg).expect("normalize");
        let twice = normalize(&once, &cfg).expect("normalize");
        assert_eq!(once, twice);
    }
}

use super::types::{Cue, Word};
use crate::config::SynthesisConfig;

/// Greedily group normalized words into micro-caption cues.
///
/// After a word is appended the open cue is closed when the word ends a
/// sentence, the cue is full, a pause follows, or absorbing the next word
/// would stretch a multi-word cue past the span limit.
pub fn segment(words: &[Word], config: &SynthesisConfig) -> Vec<Cue> {
    let max_words = config.max_words.max(1);
    let pause = config.pause_threshold();
    let span = config.max_segment_span();

    let mut cues = Vec::new();
    let mut open: Vec<Word> = Vec::with_capacity(max_words);

    for (i, word) in words.iter().enumerate() {
        open.push(word.clone());

        let close = match words.get(i + 1) {
            None => true,
            Some(next) => {
                let cue_start = open[0].start;
                word.ends_sentence()
                    || open.len() >= max_words
                    || next.start.saturating_sub(word.end) > pause
                    || (open.len() >= 2 && next.end.saturating_sub(cue_start) > span)
            }
        };

        if close {
            cues.push(Cue::from_words(std::mem::take(&mut open)));
        }
    }

    cues
}

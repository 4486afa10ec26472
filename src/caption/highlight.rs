use super::types::{Cue, Word};
use crate::config::SynthesisConfig;

pub const LEXICON_WEIGHT: u32 = 100;
pub const CONTENT_WEIGHT: u32 = 10;
const MAX_LENGTH_BONUS: u32 = 9;

/// Pick at most one emphasis word per cue. Timing is left untouched.
pub fn select_highlights(cues: &mut [Cue], config: &SynthesisConfig) {
    for cue in cues.iter_mut() {
        cue.highlight_index = best_word(&cue.words, config);
    }
}

fn best_word(words: &[Word], config: &SynthesisConfig) -> Option<usize> {
    let mut best: Option<(usize, u32)> = None;
    for (index, word) in words.iter().enumerate() {
        let score = score_word(&word.text, config);
        // strict comparison keeps the earliest word on ties
        if best.is_none_or(|(_, top)| score > top) {
            best = Some((index, score));
        }
    }
    best.filter(|&(_, score)| score >= config.min_highlight_score)
        .map(|(index, _)| index)
}

pub fn score_word(text: &str, config: &SynthesisConfig) -> u32 {
    let key: String = text
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase();
    if key.is_empty() {
        return 0;
    }

    let mut score = 0;
    if config.emphasis_lexicon.iter().any(|w| w.eq_ignore_ascii_case(&key)) {
        score += LEXICON_WEIGHT;
    }
    if !config.function_words.iter().any(|w| w.eq_ignore_ascii_case(&key)) {
        score += CONTENT_WEIGHT;
    }
    let letters = key.chars().filter(|c| c.is_alphabetic()).count() as u32;
    score + letters.min(MAX_LENGTH_BONUS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cue(texts: &[&str]) -> Cue {
        Cue::from_words(
            texts
                .iter()
                .enumerate()
                .map(|(i, t)| {
                    let start = Duration::from_millis(i as u64 * 200);
                    Word::new(*t, start, start + Duration::from_millis(180), 1.0)
                })
                .collect(),
        )
    }

    #[test]
    fn lexicon_word_wins() {
        let cfg = SynthesisConfig::default();
        let mut cues = vec![cue(&["Extraordinary", "AI", "tools"])];
        select_highlights(&mut cues, &cfg);
        assert_eq!(cues[0].highlight_index, Some(1));
    }

    #[test]
    fn longest_content_word_wins_without_lexicon() {
        let cfg = SynthesisConfig::default();
        let mut cues = vec![cue(&["the", "gorgeous", "sunset"])];
        select_highlights(&mut cues, &cfg);
        assert_eq!(cues[0].highlight_index, Some(1));
    }

    #[test]
    fn ties_go_to_earliest_word() {
        let cfg = SynthesisConfig::default();
        let mut cues = vec![cue(&["green", "tiger"])];
        select_highlights(&mut cues, &cfg);
        assert_eq!(cues[0].highlight_index, Some(0));
    }

    #[test]
    fn function_words_only_get_no_highlight() {
        let cfg = SynthesisConfig::default();
        let mut cues = vec![cue(&["and", "the", "of"]), cue(&["cat"])];
        select_highlights(&mut cues, &cfg);
        assert_eq!(cues[0].highlight_index, None);
        // three letters scores 13, below the default threshold
        assert_eq!(cues[1].highlight_index, None);
    }

    #[test]
    fn punctuation_does_not_change_score() {
        let cfg = SynthesisConfig::default();
        assert_eq!(score_word("money!", &cfg), score_word("money", &cfg));
        assert_eq!(score_word("money", &cfg), LEXICON_WEIGHT + CONTENT_WEIGHT + 5);
    }
}

//! Text-level voice activity filtering
//!
//! Recognition backends happily transcribe breath noise, keyboard clatter
//! and half-swallowed fillers. This gate sits between the recognizer and the
//! transcript: it rejects near-empty strings and short utterances made up
//! entirely of fillers or function words. It is a deterministic heuristic,
//! not a learned classifier - every rule is testable by table.

use std::collections::HashSet;

use once_cell::sync::Lazy;

/// Fillers, confirmations and function words the recognizer commonly emits
/// for non-speech audio. An utterance of three words or fewer made up only
/// of these is discarded.
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "thank", "thanks", "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for",
        "of", "with", "by", "is", "are", "was", "were", "be", "been", "being", "have", "has",
        "had", "do", "does", "did", "will", "would", "could", "should", "um", "uh", "huh", "er", "ah",
        "like", "you", "know", "i", "mean", "so", "well", "ok", "okay", "yeah", "yes", "no",
        "hi", "hello", "hey", "bye", "goodbye", "please", "sorry",
    ]
    .into_iter()
    .collect()
});

/// Articles and prepositions only; a very short utterance made up solely of
/// these is treated as noise even above the stop-word length cutoff.
static FUNCTION_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    ]
    .into_iter()
    .collect()
});

/// Maximum word count for the all-stop-words rejection
const MAX_STOPWORD_UTTERANCE_WORDS: usize = 3;
/// Maximum character length for the all-function-words rejection
const MAX_FUNCTION_WORD_UTTERANCE_CHARS: usize = 10;

/// Decide whether a recognition result is likely real candidate speech.
///
/// Failing this filter means "detected but discarded": the text is logged at
/// debug level by the caller and never reaches the transcript.
pub fn is_likely_speech(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.len() < 2 {
        return false;
    }

    let lower = trimmed.to_lowercase();
    let words: Vec<&str> = lower
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| !w.is_empty())
        .collect();

    if words.is_empty() {
        return false;
    }

    if words.len() <= MAX_STOPWORD_UTTERANCE_WORDS
        && words.iter().all(|w| STOP_WORDS.contains(w))
    {
        return false;
    }

    if lower.len() <= MAX_FUNCTION_WORD_UTTERANCE_CHARS
        && words.iter().all(|w| FUNCTION_WORDS.contains(w))
    {
        return false;
    }

    true
}

//! Engagement signal: does a captured utterance look like a real answer?

/// Utterances that never count as engagement
pub const NEGATIVE_FILLERS: &[&str] = &["no", "no.", "nah", "none"];

/// True for non-empty speech that is not a negative filler and has at least
/// `min_words` words.
pub fn looks_like_real_speech(utterance: &str, min_words: usize) -> bool {
    let normalized = utterance.trim().to_lowercase();
    if normalized.is_empty() {
        return false;
    }
    if NEGATIVE_FILLERS.contains(&normalized.as_str()) {
        return false;
    }
    normalized.split_whitespace().count() >= min_words.max(1)
}

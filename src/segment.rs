//! Sentence segmenter — turns a token stream into speakable sentences.
//!
//! Tokens accumulate in a buffer; whenever a token ends in terminal
//! punctuation the buffer is classified, and on a boundary the whole buffer
//! flushes as one sentence. This keeps time-to-first-audio low: synthesis
//! starts on the first complete sentence while the generator is still
//! producing the rest of the reply.
//!
//! The boundary classifier guards against abbreviation periods ("Dr.",
//! "e.g."), single-letter initials ("J."), and numeric periods ("3."), all
//! of which continue the sentence.

/// Terminal punctuation that can end a sentence.
const TERMINALS: [char; 3] = ['.', '!', '?'];

/// Abbreviations whose trailing period does not end a sentence.
/// Compared lowercase, after stripping non-word/non-dot characters.
const ABBREVIATIONS: &[&str] = &[
    "dr", "mr", "mrs", "ms", "jr", "sr", "st", "prof", "inc", "ltd", "fig", "dept", "no", "vs",
    "gen", "col", "lt", "etc", "al", "u.s", "e.g", "i.e",
];

/// Whether the text contains at least one word character. Whitespace-only
/// and punctuation-only spans are never worth speaking.
#[must_use]
pub fn is_meaningful(text: &str) -> bool {
    text.chars().any(|c| c.is_alphanumeric() || c == '_')
}

/// Classify whether `text` ends at a sentence boundary.
#[must_use]
pub fn is_sentence_end(text: &str) -> bool {
    let stripped = text.trim_end();
    let Some(last) = stripped.chars().last() else {
        return false;
    };
    if last == '!' || last == '?' {
        return true;
    }
    if last != '.' {
        return false;
    }

    let before_dot = stripped[..stripped.len() - 1].trim_end();
    let Some(raw_word) = before_dot.split_whitespace().last() else {
        return false;
    };
    let word: String = raw_word
        .to_lowercase()
        .chars()
        .filter(|&c| c.is_alphanumeric() || c == '_' || c == '.')
        .collect();

    if word.is_empty()
        || ABBREVIATIONS.contains(&word.as_str())
        || word.chars().count() == 1
        || word.chars().all(|c| c.is_ascii_digit())
    {
        return false;
    }
    true
}

/// Token accumulator with sentence-boundary detection.
///
/// Created empty per reply turn. [`push`](Self::push) returns a completed
/// sentence when a boundary is detected; [`flush`](Self::flush) returns the
/// trailing partial when the token stream ends. Each span of text flushes
/// exactly once, whichever of the two happens first.
#[derive(Debug, Default)]
pub struct SentenceSegmenter {
    buffer: String,
}

impl SentenceSegmenter {
    /// Create an empty segmenter for one reply turn.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one token; returns a complete sentence if this token closed
    /// a boundary.
    ///
    /// The boundary classifier only runs when the token itself ends in
    /// terminal punctuation, so mid-word periods arriving split across
    /// tokens never trigger a spurious check.
    pub fn push(&mut self, token: &str) -> Option<String> {
        if token.is_empty() {
            return None;
        }
        self.buffer.push_str(token);

        let ends_terminal = token.chars().last().is_some_and(|c| TERMINALS.contains(&c));
        if ends_terminal && is_sentence_end(&self.buffer) {
            let sentence = self.buffer.trim().to_string();
            self.buffer.clear();
            return Some(sentence);
        }
        None
    }

    /// Flush the trailing partial sentence, if it is worth speaking.
    ///
    /// Unconditional with respect to punctuation: a reply that ends
    /// mid-sentence is still spoken.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if is_meaningful(rest) {
            Some(rest.to_string())
        } else {
            None
        }
    }
}

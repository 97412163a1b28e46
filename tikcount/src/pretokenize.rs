//! Splitting text into chunks before the merge loop runs.
//!
//! Merges never cross a chunk boundary, so the pattern decides things like "a leading space
//! belongs to the following word" and "digits come in groups of at most three".
use std::ops::Range;
use tracing::*;

/// Pattern of the `gpt2-like` encoding: contractions, letter runs and digit runs of at most
/// three (each with an optional leading space), punctuation runs, and whitespace runs.
pub const GPT2_LIKE_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}{1,3}| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

/// Pattern of `r50k_base`, `p50k_base` and `p50k_edit`.  Digit runs are unbounded.
pub const R50K_PATTERN: &str =
    r"'s|'t|'re|'ve|'m|'ll|'d| ?\p{L}+| ?\p{N}+| ?[^\s\p{L}\p{N}]+|\s+(?!\S)|\s+";

pub const CL100K_PATTERN: &str = r"(?i:'s|'t|'re|'ve|'m|'ll|'d)|[^\r\n\p{L}\p{N}]?\p{L}+|\p{N}{1,3}| ?[^\s\p{L}\p{N}]+[\r\n]*|\s*[\r\n]+|\s+(?!\S)|\s+";

pub const O200K_PATTERN: &str = concat!(
    r"[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]*[\p{Ll}\p{Lm}\p{Lo}\p{M}]+",
    r"(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    r"|[^\r\n\p{L}\p{N}]?[\p{Lu}\p{Lt}\p{Lm}\p{Lo}\p{M}]+[\p{Ll}\p{Lm}\p{Lo}\p{M}]*",
    r"(?i:'s|'t|'re|'ve|'m|'ll|'d)?",
    r"|\p{N}{1,3}",
    r"| ?[^\s\p{L}\p{N}]+[\r\n/]*",
    r"|\s*[\r\n]+",
    r"|\s+(?!\S)",
    r"|\s+",
);

/// Splits text into chunks with a regex.
///
/// The regex patterns used by OpenAI encodings need lookahead, which the `regex` crate doesn't
/// support, so the slower `fancy_regex` is used.
///
/// Splitting never loses text: whatever the pattern doesn't match is yielded as a chunk of its
/// own, so the chunks always concatenate back to the input.
#[derive(Clone, Debug)]
pub struct Pretokenizer {
    regex: fancy_regex::Regex,
}

impl Pretokenizer {
    pub fn new(pattern: &str) -> Result<Self, fancy_regex::Error> {
        Ok(Self {
            regex: fancy_regex::Regex::new(pattern)?,
        })
    }

    /// Like [`Self::new`], but gives up on a match after `limit` backtracking steps.  Text where
    /// the regex gives up is split one character at a time.
    pub fn with_backtrack_limit(pattern: &str, limit: usize) -> Result<Self, fancy_regex::Error> {
        Ok(Self {
            regex: fancy_regex::RegexBuilder::new(pattern)
                .backtrack_limit(limit)
                .build()?,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    /// Split `text` into chunks, in order.
    pub fn split<'a>(&'a self, text: &'a str) -> Chunks<'a> {
        Chunks {
            regex: &self.regex,
            text,
            pos: 0,
            pending: None,
        }
    }
}

/// Iterator over the chunks of a text.  See [`Pretokenizer::split`].
pub struct Chunks<'a> {
    regex: &'a fancy_regex::Regex,
    text: &'a str,

    /// The offset into `text` where the next chunk starts
    pos: usize,

    /// A match found after a span the pattern skipped.  The skipped span is yielded first and
    /// this match right after it.
    pending: Option<Range<usize>>,
}

impl<'a> Chunks<'a> {
    fn emit(&mut self, range: Range<usize>) -> &'a str {
        self.pos = range.end;
        &self.text[range]
    }

    /// The range of the single character at `pos`
    fn next_char(&self) -> Range<usize> {
        let len = self.text[self.pos..]
            .chars()
            .next()
            .map_or(0, char::len_utf8);
        self.pos..self.pos + len
    }
}

impl<'a> Iterator for Chunks<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(range) = self.pending.take() {
            return Some(self.emit(range));
        }

        if self.pos >= self.text.len() {
            return None;
        }

        let range = match self.regex.find_from_pos(self.text, self.pos) {
            Ok(Some(m)) if m.start() > self.pos => {
                if m.end() > m.start() {
                    self.pending = Some(m.start()..m.end());
                }
                self.pos..m.start()
            }
            Ok(Some(m)) if m.end() > m.start() => m.start()..m.end(),
            // An empty match would never advance, so take one character instead
            Ok(Some(_)) => self.next_char(),
            Ok(None) => self.pos..self.text.len(),
            Err(e) => {
                // Most likely the backtrack limit on a pathological input
                warn!(
                    err = %e,
                    pos = self.pos,
                    "Pretokenizer regex failed; splitting off a single character"
                );
                self.next_char()
            }
        };

        Some(self.emit(range))
    }
}

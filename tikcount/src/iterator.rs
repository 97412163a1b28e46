//! Contains the implementation of the bulk of the tokenization logic, implemented as a Rust
//! [`Iterator`].
use crate::encoding::EncodingParams;
use crate::pretokenize::Chunks;
use crate::TokenInt;
use std::collections::VecDeque;

/// A piece of the input text: either a run of ordinary text, or one special token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Segment<'a> {
    Text(&'a str),
    Special(TokenInt),
}

/// Breaks the input text up at special tokens.
///
/// Without a special token finder the whole text is one [`Segment::Text`].
pub(crate) struct Segments<'a> {
    params: &'a EncodingParams,
    text: &'a str,

    /// Special token matches in `text`, or `None` when special tokens are treated as ordinary
    /// text
    matches: Option<aho_corasick::FindIter<'a, 'a, usize>>,

    /// The offset into `text` where the next segment starts
    pos: usize,

    /// A special token found after some ordinary text.  The text is yielded first and this token
    /// right after it.
    pending_special: Option<TokenInt>,
}

impl<'a> Segments<'a> {
    pub(crate) fn new(params: &'a EncodingParams, text: &'a str, allow_special: bool) -> Self {
        Self {
            params,
            text,
            matches: allow_special.then(|| params.special_tokens_finder.find_iter(text)),
            pos: 0,
            pending_special: None,
        }
    }
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(token) = self.pending_special.take() {
            return Some(Segment::Special(token));
        }

        if self.pos >= self.text.len() {
            return None;
        }

        let start = self.pos;
        match self.matches.as_mut().and_then(Iterator::next) {
            Some(m) => {
                let token = self.params.special_token_ids[m.pattern()];
                self.pos = m.end();

                if m.start() > start {
                    self.pending_special = Some(token);
                    Some(Segment::Text(&self.text[start..m.start()]))
                } else {
                    Some(Segment::Special(token))
                }
            }
            None => {
                self.pos = self.text.len();
                Some(Segment::Text(&self.text[start..]))
            }
        }
    }
}

/// The iterator which yields the tokens of a string of text.
///
/// Depending on how it was created, special tokens in the text are either yielded as their
/// special ids, or treated like any other text and broken up into subword tokens.
///
/// See [`crate::Encoding::encode_iter`] and [`crate::Encoding::encode_ordinary_iter`]
pub struct EncodeIterator<'a> {
    params: &'a EncodingParams,
    text: &'a str,
    segments: Segments<'a>,

    /// Chunks of the text segment currently being encoded
    chunks: Option<Chunks<'a>>,

    /// Tokens of the current chunk, if the chunk itself didn't map directly to a token.  They're
    /// removed from the front of the queue one iteration cycle at a time
    pending: VecDeque<TokenInt>,
}

impl<'a> EncodeIterator<'a> {
    pub(crate) fn new(params: &'a EncodingParams, text: &'a str, allow_special: bool) -> Self {
        Self {
            params,
            text,
            segments: Segments::new(params, text, allow_special),
            chunks: None,
            pending: VecDeque::new(),
        }
    }
}

impl<'a> Iterator for EncodeIterator<'a> {
    type Item = TokenInt;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            // If there are still tokens left from a previously encoded chunk, use one of them
            if let Some(token) = self.pending.pop_front() {
                return Some(token);
            }

            if let Some(chunk) = self.chunks.as_mut().and_then(Iterator::next) {
                self.params.encode_chunk(chunk, &mut self.pending);
                continue;
            }

            // The current segment is exhausted; move on to the next one, or stop if there are
            // none left
            match self.segments.next()? {
                Segment::Special(token) => return Some(token),
                Segment::Text(text) => self.chunks = Some(self.params.pretokenizer.split(text)),
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        // Every token covers at least one byte of the input
        (self.pending.len(), Some(self.text.len()))
    }
}

/// Count the tokens of `text` without materializing them.
pub(crate) fn count_tokens(params: &EncodingParams, text: &str, allow_special: bool) -> usize {
    Segments::new(params, text, allow_special)
        .map(|segment| match segment {
            Segment::Special(_) => 1,
            Segment::Text(text) => params
                .pretokenizer
                .split(text)
                .map(|chunk| params.count_chunk(chunk))
                .sum(),
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Config, EncodingType};

    fn params() -> EncodingParams {
        EncodingParams::load(EncodingType::Gpt2Like, &Config::default()).unwrap()
    }

    #[test]
    fn segments_split_at_special_tokens() {
        let params = params();
        let segments =
            |text, allow_special| Segments::new(&params, text, allow_special).collect::<Vec<_>>();

        assert!(segments("", true).is_empty());
        assert_eq!(vec![Segment::Text("foo bar")], segments("foo bar", true));
        assert_eq!(
            vec![
                Segment::Text("hello"),
                Segment::Special(415),
                Segment::Text("world")
            ],
            segments("hello<|endoftext|>world", true)
        );
        assert_eq!(
            vec![Segment::Special(415), Segment::Special(415)],
            segments("<|endoftext|><|endoftext|>", true)
        );
        assert_eq!(
            vec![Segment::Text("hello<|endoftext|>world")],
            segments("hello<|endoftext|>world", false)
        );
    }

    #[test]
    fn encode_iterator_matches_count() {
        let params = params();

        for text in [
            "",
            "hello world",
            "hello<|endoftext|>world",
            "<|endoftext|>",
            "The quick brown fox jumps over the lazy dog.",
        ] {
            for allow_special in [true, false] {
                let tokens: Vec<_> = EncodeIterator::new(&params, text, allow_special).collect();
                assert_eq!(tokens.len(), count_tokens(&params, text, allow_special));
            }
        }

        let tokens: Vec<_> = EncodeIterator::new(&params, "hello world", true).collect();
        assert_eq!(vec![257, 296, 299], tokens);
    }
}

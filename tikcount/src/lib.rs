//! tikcount is a pure Rust byte pair encoding tokenizer, built for one job above all others:
//! counting how many tokens a piece of text costs under a given encoding.
//!
//! Most callers only need a [`Session`]:
//!
//! ```
//! let mut session = tikcount::Session::new();
//! session.init("gpt2-like").unwrap();
//! assert_eq!(3, session.count("hello world").unwrap());
//! session.cleanup();
//! ```
//!
//! An [`Encoding`] gives direct access to encoding and decoding without the session lifecycle.
use snafu::ResultExt;
use std::sync::Arc;

mod bpe;
mod cache;
mod config;
mod encoding;
mod error;
mod iterator;
pub mod pretokenize;
mod session;
mod token;
pub mod vocab;

pub use bpe::{byte_pair_count, byte_pair_encode, byte_pair_split};
pub use cache::CacheStats;
pub use config::{Config, CACHE_CAPACITY_ENV, VOCAB_DIR_ENV};
pub use encoding::{EncodingParams, EncodingType};
pub use error::*;
pub use iterator::EncodeIterator;
pub use pretokenize::Pretokenizer;
pub use session::{Session, SessionStatus};
pub use token::*;
pub use vocab::{VocabularyBuilder, VocabularyTable};

use tracing::*;

/// A loaded text encoding.
///
/// With this encoding, it's possible to tokenize input text into numeric tokens, count them, and
/// decode tokens back into the text they came from.
///
/// Instances of `Encoding` are light weight and can be very cheaply cloned.  They are also thread
/// safe; a single instance can be used to encode or decode text in multiple threads
/// simultaneously, although with Rust ownership rules it's usually more convenient to make a clone
/// of the encoding for each thread.
#[derive(Clone)]
pub struct Encoding {
    params: Arc<EncodingParams>,
}

impl Encoding {
    /// Load an encoding, reading any vocabulary files from the locations in `config`.
    pub fn load(typ: EncodingType, config: &Config) -> Result<Self, InitError> {
        Ok(Self::from_params(EncodingParams::load(typ, config)?))
    }

    /// Load an encoding by its name, such as `cl100k_base`.
    pub fn from_name(name: &str, config: &Config) -> Result<Self, InitError> {
        Self::load(EncodingType::from_name(name)?, config)
    }

    /// Make an encoding out of an already built vocabulary, using the pretokenizer of `typ`.
    pub fn from_vocabulary(typ: EncodingType, vocab: VocabularyTable, config: &Config) -> Self {
        Self::from_params(EncodingParams::new(typ, vocab, config.cache_capacity))
    }

    fn from_params(params: EncodingParams) -> Self {
        Self {
            params: Arc::new(params),
        }
    }

    pub fn encoding_type(&self) -> EncodingType {
        self.params.typ
    }

    pub fn name(&self) -> &'static str {
        self.params.typ.name()
    }

    pub fn vocab(&self) -> &VocabularyTable {
        &self.params.vocab
    }

    pub fn pretokenizer(&self) -> &Pretokenizer {
        &self.params.pretokenizer
    }

    /// Split `text` into the chunks the merge loop works on, ignoring special tokens.
    pub fn split<'a>(&'a self, text: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.params.pretokenizer.split(text)
    }

    /// Hit and miss counts of the chunk cache, or `None` if the cache is disabled
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.params.cache.as_ref().map(|cache| cache.stats())
    }

    /// Forget every memoized chunk.  Does nothing if the cache is disabled.
    pub fn clear_cache(&self) {
        if let Some(cache) = &self.params.cache {
            cache.clear();
        }
    }

    /// The special token strings and their corresponding integer ids, for this encoding
    pub fn special_tokens(&self) -> impl Iterator<Item = (&[u8], TokenInt)> {
        self.params.vocab.special_tokens()
    }

    /// Search the given input text for "special" tokens, returning an iterator that yields all
    /// special tokens in the input text.
    ///
    /// If you just need to know if there are any special tokens in the text, you can call
    /// [`Iterator::any`]
    pub fn find_special_tokens<'me, 'text>(
        &'me self,
        text: &'text str,
    ) -> impl Iterator<Item = &'text str> + 'text
    where
        'me: 'text,
    {
        self.params
            .special_tokens_finder
            .find_iter(text)
            .map(move |m| &text[m.start()..m.end()])
    }

    /// Make an educated guess as to the number of likely tokens in a given bit of text.
    ///
    /// This is not a precise calculation, but it's a good enough estimate for most purposes.  For
    /// example if you want to pre-allocate a Vec to hold the tokens for a string, this is a good
    /// choice for the target capacity.
    pub fn estimate_num_tokens(&self, text: impl AsRef<str>) -> usize {
        self.params.estimate_num_tokens(text.as_ref())
    }

    /// Lazily encode `text`, yielding special tokens as their special ids.
    pub fn encode_iter<'a>(&'a self, text: &'a str) -> EncodeIterator<'a> {
        EncodeIterator::new(&self.params, text, true)
    }

    /// Lazily encode `text`, treating special tokens like any other text.
    pub fn encode_ordinary_iter<'a>(&'a self, text: &'a str) -> EncodeIterator<'a> {
        EncodeIterator::new(&self.params, text, false)
    }

    /// Encode the specified text into a sequence of tokens, including encoding "special" tokens.
    /// If `text` contains any special tokens, they will be encoded into the special `TokenInt`
    /// values assigned to the special tokens for this encoding.
    ///
    /// If you want to detect text that contains certain special tokens, to avoid abuse of the
    /// model or potentially unwanted behavior, use the [`Self::find_special_tokens`] function to
    /// scan input for special tokens, and take whatever action you need if any are found.
    pub fn encode(&self, text: impl AsRef<str>) -> Vec<TokenInt> {
        let text = text.as_ref();
        let mut tokens = Vec::with_capacity(self.estimate_num_tokens(text));
        tokens.extend(self.encode_iter(text));
        trace!(
            encoding = %self.params.typ,
            bytes = text.len(),
            tokens = tokens.len(),
            "Encoded text"
        );
        tokens
    }

    /// Encode the specified text into a sequence of tokens, without any special handling for
    /// "special" tokens.  If `text` contains any special tokens, they will be treated like any
    /// other text, and broken up into subword tokens.
    pub fn encode_ordinary(&self, text: impl AsRef<str>) -> Vec<TokenInt> {
        let text = text.as_ref();
        let mut tokens = Vec::with_capacity(self.estimate_num_tokens(text));
        tokens.extend(self.encode_ordinary_iter(text));
        tokens
    }

    /// Count the tokens `text` encodes to, recognizing special tokens.
    ///
    /// Always equal to `self.encode(text).len()`, but without building the token list.
    pub fn count(&self, text: impl AsRef<str>) -> usize {
        let text = text.as_ref();
        let count = iterator::count_tokens(&self.params, text, true);
        trace!(
            encoding = %self.params.typ,
            bytes = text.len(),
            count,
            "Counted tokens"
        );
        count
    }

    /// Count the tokens `text` encodes to, treating special tokens like any other text.
    pub fn count_ordinary(&self, text: impl AsRef<str>) -> usize {
        let text = text.as_ref();
        let count = iterator::count_tokens(&self.params, text, false);
        trace!(
            encoding = %self.params.typ,
            bytes = text.len(),
            count,
            "Counted ordinary tokens"
        );
        count
    }

    /// Decode a set of tokens into the string that they came from.
    ///
    /// Note that encoders can sometimes take a valid UTF-8 string as input, and break it down into
    /// subword tokens such that some of those tokens are not actually valid UTF-8 code points.
    /// Therefore, decoding to a string is a fallible operation.  As long as the input `tokens`
    /// came from a UTF-8 string, and the sequence of tokens has not been modified or truncated,
    /// then this will succeed.
    pub fn decode_tokens_to_string(&self, tokens: &[TokenInt]) -> Result<String, DecodeError> {
        let bytes = self.decode_tokens_to_bytes(tokens)?;

        String::from_utf8(bytes).context(error::InvalidUtf8Snafu)
    }

    /// Decode a set of tokens into the bytes that they came from.
    ///
    /// This is fallible only in case the tokens passed in to `tokens` came from a different
    /// encoding, and thus the integer representation doesn't correspond to an actual token byte
    /// sequence.
    pub fn decode_tokens_to_bytes(&self, tokens: &[TokenInt]) -> Result<TokenString, DecodeError> {
        let len = tokens
            .iter()
            .map(|token| self.token_len(*token).unwrap_or_default())
            .sum();
        let mut bytes = Vec::with_capacity(len);

        for token in tokens {
            let token_bytes = self
                .decode_token(*token)
                .ok_or_else(|| error::UnknownTokenSnafu { token: *token }.build())?;
            bytes.extend_from_slice(token_bytes);
        }

        Ok(bytes)
    }

    /// Decode a single token into the byte sequence it corresponds to.
    ///
    /// If the token isn't one that is used by this encoding, this returns `None`.
    pub fn decode_token(&self, token: TokenInt) -> Option<&[u8]> {
        self.params.vocab.decode_token(token)
    }

    /// Given a token, return the length of the corresponding byte sequence in bytes.
    pub fn token_len(&self, token: TokenInt) -> Option<usize> {
        self.params.vocab.token_len(token)
    }
}

impl std::fmt::Debug for Encoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoding")
            .field("name", &self.name())
            .field("tokens", &self.params.vocab.len())
            .finish()
    }
}

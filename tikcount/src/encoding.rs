use crate::bpe;
use crate::cache::ChunkCache;
use crate::config::Config;
use crate::error::{self, InitError};
use crate::pretokenize::{self, Pretokenizer};
use crate::token::TokenInt;
use crate::vocab::{data, VocabSource, VocabularyTable};
use std::time::Instant;
use strum::{EnumIter, EnumString, EnumVariantNames, IntoStaticStr};
use tracing::*;

const ENDOFTEXT: &str = "<|endoftext|>";
const FIM_PREFIX: &str = "<|fim_prefix|>";
const FIM_MIDDLE: &str = "<|fim_middle|>";
const FIM_SUFFIX: &str = "<|fim_suffix|>";
const ENDOFPROMPT: &str = "<|endofprompt|>";

/// The encodings that can be loaded by name.
///
/// Each of these uses a BPE subword tokenizing approach, but with different sets of tokens and
/// merge ranks, and with a different regex for breaking up text into approximate word
/// boundaries.
#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    PartialEq,
    Hash,
    EnumString,
    EnumIter,
    EnumVariantNames,
    IntoStaticStr,
    strum::Display,
)]
pub enum EncodingType {
    /// A small byte-level vocabulary that ships inside the crate
    #[strum(serialize = "gpt2-like")]
    Gpt2Like,
    #[strum(serialize = "r50k_base")]
    R50kBase,
    #[strum(serialize = "p50k_base")]
    P50kBase,
    #[strum(serialize = "p50k_edit")]
    P50kEdit,
    #[strum(serialize = "cl100k_base")]
    Cl100kBase,
    #[strum(serialize = "o200k_base")]
    O200kBase,
}

impl EncodingType {
    /// Resolve an encoding name, failing with [`InitError::UnknownEncoding`] for names that
    /// aren't supported.
    pub fn from_name(name: &str) -> Result<Self, InitError> {
        name.parse()
            .map_err(|_| error::UnknownEncodingSnafu { encoding: name }.build())
    }

    pub fn name(self) -> &'static str {
        self.into()
    }

    /// The pretokenizer regex for this encoding
    pub fn pattern(self) -> &'static str {
        match self {
            Self::Gpt2Like => pretokenize::GPT2_LIKE_PATTERN,
            Self::R50kBase | Self::P50kBase | Self::P50kEdit => pretokenize::R50K_PATTERN,
            Self::Cl100kBase => pretokenize::CL100K_PATTERN,
            Self::O200kBase => pretokenize::O200K_PATTERN,
        }
    }

    pub fn vocab_source(self) -> VocabSource {
        match self {
            Self::Gpt2Like => VocabSource::Embedded("gpt2-like.bpe"),
            Self::R50kBase => VocabSource::Tiktoken("r50k_base.tiktoken"),
            // p50k_edit and p50k_base share the same tokens
            Self::P50kBase | Self::P50kEdit => VocabSource::Tiktoken("p50k_base.tiktoken"),
            Self::Cl100kBase => VocabSource::Tiktoken("cl100k_base.tiktoken"),
            Self::O200kBase => VocabSource::Tiktoken("o200k_base.tiktoken"),
        }
    }

    /// Special tokens added on top of a `.tiktoken` vocabulary.  `.bpe` vocabularies declare
    /// their own.
    fn tiktoken_special_tokens(self) -> &'static [(&'static str, TokenInt)] {
        match self {
            Self::Gpt2Like => &[],
            Self::R50kBase | Self::P50kBase => &[(ENDOFTEXT, 50256)],
            Self::P50kEdit => &[
                (ENDOFTEXT, 50256),
                (FIM_PREFIX, 50281),
                (FIM_MIDDLE, 50282),
                (FIM_SUFFIX, 50283),
            ],
            Self::Cl100kBase => &[
                (ENDOFTEXT, 100257),
                (FIM_PREFIX, 100258),
                (FIM_MIDDLE, 100259),
                (FIM_SUFFIX, 100260),
                (ENDOFPROMPT, 100276),
            ],
            Self::O200kBase => &[(ENDOFTEXT, 199999), (ENDOFPROMPT, 200018)],
        }
    }
}

/// Everything needed to encode text with one loaded encoding.
pub struct EncodingParams {
    pub(crate) typ: EncodingType,

    pub(crate) vocab: VocabularyTable,

    pub(crate) pretokenizer: Pretokenizer,

    /// A/C automaton for finding special tokens in text
    pub(crate) special_tokens_finder: aho_corasick::AhoCorasick,

    /// Id of the special token for each pattern in `special_tokens_finder`
    pub(crate) special_token_ids: Vec<TokenInt>,

    pub(crate) cache: Option<ChunkCache>,
}

impl EncodingParams {
    /// Load the vocabulary for `typ` and compile its pretokenizer.
    pub fn load(typ: EncodingType, config: &Config) -> Result<Self, InitError> {
        let started = Instant::now();

        let vocab = data::load_vocabulary(
            typ.name(),
            typ.vocab_source(),
            typ.tiktoken_special_tokens(),
            config,
        )?;

        let params = Self::new(typ, vocab, config.cache_capacity);

        info!(
            encoding = %typ,
            tokens = params.vocab.len(),
            merges = params.vocab.num_merges(),
            special_tokens = params.special_token_ids.len(),
            cache_capacity = config.cache_capacity,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Loaded encoding"
        );

        Ok(params)
    }

    pub(crate) fn new(typ: EncodingType, vocab: VocabularyTable, cache_capacity: usize) -> Self {
        let (special_tokens, special_token_ids): (Vec<&[u8]>, Vec<TokenInt>) =
            vocab.special_tokens().unzip();

        // Make an aho-corasick automaton that quickly finds any of the special tokens in text.
        // This is faster than a regex, since special tokens are always plain literals.
        let special_tokens_finder = aho_corasick::AhoCorasickBuilder::new()
            .match_kind(aho_corasick::MatchKind::LeftmostLongest)
            .dfa(true)
            .build(special_tokens);

        Self {
            typ,
            pretokenizer: Pretokenizer::new(typ.pattern()).expect("BUG: Invalid regex"),
            special_tokens_finder,
            special_token_ids,
            cache: ChunkCache::new(cache_capacity),
            vocab,
        }
    }

    /// Make an educated guess as to the number of likely tokens in a given bit of text.
    pub fn estimate_num_tokens(&self, text: &str) -> usize {
        // Use a dumb strategy: we know the mean length of a token in this encoding, and assume the
        // text is full of the mean tokens.
        let mean = self.vocab.mean_token_len();
        (text.len() + mean - 1) / mean
    }

    /// Append the tokens of one pretokenized chunk to `out`.
    pub(crate) fn encode_chunk(&self, chunk: &str, out: &mut impl Extend<TokenInt>) {
        let bytes = chunk.as_bytes();

        // Either the chunk is itself a token, in which case we're done, or it needs to be broken
        // up into subword tokens with the merge loop
        if let Some(token) = self.vocab.token_for_bytes(bytes) {
            out.extend(Some(token));
            return;
        }

        match &self.cache {
            Some(cache) => {
                let tokens = cache.get_or_insert_with(bytes, || {
                    bpe::byte_pair_encode(bytes, &self.vocab)
                });
                out.extend(tokens.iter().copied());
            }
            None => out.extend(bpe::byte_pair_encode(bytes, &self.vocab)),
        }
    }

    /// Number of tokens in one pretokenized chunk, without building the token list when the
    /// cache is off.
    pub(crate) fn count_chunk(&self, chunk: &str) -> usize {
        let bytes = chunk.as_bytes();

        if self.vocab.token_for_bytes(bytes).is_some() {
            return 1;
        }

        match &self.cache {
            Some(cache) => cache
                .get_or_insert_with(bytes, || bpe::byte_pair_encode(bytes, &self.vocab))
                .len(),
            None => bpe::byte_pair_count(bytes, &self.vocab),
        }
    }
}

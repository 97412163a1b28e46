//! The vocabulary of an encoding: which byte sequences are tokens, which ids they have, and the
//! ordered merge rules that build multi-byte tokens out of smaller ones.
//!
//! A [`VocabularyTable`] is immutable once built.  The only way to make one is through
//! [`VocabularyBuilder`], which validates every token and merge as it is added, or through the
//! parsers in [`format`] which drive the builder.
use crate::error::{self, VocabError};
use crate::token::{Merge, Rank, TokenEntry, TokenInt, TokenString};
use snafu::{ensure, OptionExt};
use std::fmt;

pub(crate) mod data;
pub mod format;
mod hash;

pub use data::VocabSource;
pub use format::{parse_bpe, parse_tiktoken, write_bpe};
pub use hash::{MergeTable, TokenDecoder, TokenEncoder};

use hash::HashMap;

/// The loaded, validated vocabulary of one encoding.
#[derive(Clone, PartialEq, Eq)]
pub struct VocabularyTable {
    encoder: TokenEncoder,
    decoder: TokenDecoder,

    /// Merge rank of every token that is produced by a merge
    ranks: HashMap<TokenInt, Rank>,

    merges: MergeTable,

    /// The same merges as `merges`, in rank order
    merge_order: Vec<Merge>,

    /// Token id of every single byte value, indexed by the byte
    byte_tokens: [TokenInt; 256],

    special_encoder: TokenEncoder,
    special_decoder: TokenDecoder,

    /// Ids of the special tokens, in ascending order
    special_ids: Vec<TokenInt>,

    /// The mean length of an ordinary token in bytes, never less than 1.
    ///
    /// This is used when we need to estimate how many tokens are likely to be in a string.
    mean_token_len: usize,
}

impl VocabularyTable {
    /// Look up a byte sequence, returning its id and the rank of the merge that produces it.
    pub fn lookup(&self, bytes: impl AsRef<[u8]>) -> Option<TokenEntry> {
        self.encoder.token_for_bytes(bytes).map(|id| TokenEntry {
            id,
            rank: self.ranks.get(&id).copied(),
        })
    }

    #[inline]
    pub fn token_for_bytes(&self, bytes: impl AsRef<[u8]>) -> Option<TokenInt> {
        self.encoder.token_for_bytes(bytes)
    }

    /// The bytes of an ordinary token.  Special tokens are not included; see
    /// [`Self::decode_token`].
    pub fn bytes_for_token(&self, token: TokenInt) -> Option<&[u8]> {
        self.decoder.bytes_for_token(token).map(Vec::as_slice)
    }

    /// The bytes of any token, ordinary or special.
    pub fn decode_token(&self, token: TokenInt) -> Option<&[u8]> {
        self.decoder
            .bytes_for_token(token)
            .or_else(|| self.special_decoder.bytes_for_token(token))
            .map(Vec::as_slice)
    }

    /// Like [`Self::decode_token`] but without handing out the bytes.
    pub fn token_len(&self, token: TokenInt) -> Option<usize> {
        self.decoder
            .token_len(token)
            .or_else(|| self.special_decoder.token_len(token))
    }

    /// The single-byte token for `byte`.  Always present; the builder refuses vocabularies that
    /// lack one.
    #[inline]
    pub fn byte_token(&self, byte: u8) -> TokenInt {
        self.byte_tokens[byte as usize]
    }

    pub(crate) fn byte_tokens(&self) -> &[TokenInt; 256] {
        &self.byte_tokens
    }

    #[inline]
    pub fn merge(&self, left: TokenInt, right: TokenInt) -> Option<&Merge> {
        self.merges.get(left, right)
    }

    pub(crate) fn merge_table(&self) -> &MergeTable {
        &self.merges
    }

    /// The merge rank of `token`, or `None` for single-byte, special and unknown tokens.
    pub fn rank_of(&self, token: TokenInt) -> Option<Rank> {
        self.ranks.get(&token).copied()
    }

    pub fn special_token_for_bytes(&self, bytes: impl AsRef<[u8]>) -> Option<TokenInt> {
        self.special_encoder.token_for_bytes(bytes)
    }

    pub fn is_special(&self, token: TokenInt) -> bool {
        self.special_decoder.contains(token)
    }

    /// Number of ordinary tokens
    pub fn len(&self) -> usize {
        self.encoder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.encoder.is_empty()
    }

    pub fn num_merges(&self) -> usize {
        self.merge_order.len()
    }

    /// All ordinary tokens as `(bytes, id)`, in no particular order.
    pub fn tokens(&self) -> impl Iterator<Item = (&TokenString, TokenInt)> {
        self.encoder.tokens()
    }

    /// All merge rules in rank order.
    pub fn merges(&self) -> &[Merge] {
        &self.merge_order
    }

    /// All special tokens as `(bytes, id)`, in id order.
    pub fn special_tokens(&self) -> impl Iterator<Item = (&[u8], TokenInt)> {
        self.special_ids.iter().filter_map(|id| {
            self.special_decoder
                .bytes_for_token(*id)
                .map(|bytes| (bytes.as_slice(), *id))
        })
    }

    pub fn mean_token_len(&self) -> usize {
        self.mean_token_len
    }

    /// Check that every multi-byte token is produced by a merge, and that every merged token is
    /// reproduced when its own bytes are run through the merge loop.
    ///
    /// When this holds, looking a whole chunk up as a single token gives the same answer as
    /// merging it byte by byte, which is what lets the encoder take that shortcut.
    pub fn verify_merges(&self) -> Result<(), VocabError> {
        let unreachable = self
            .encoder
            .tokens()
            .filter(|(bytes, id)| bytes.len() > 1 && !self.ranks.contains_key(id))
            .map(|(_, id)| id)
            .min();
        if let Some(token) = unreachable {
            return error::UnreachableSnafu { token }.fail();
        }

        for merge in &self.merge_order {
            let bytes = self
                .decoder
                .bytes_for_token(merge.merged)
                .context(error::UnknownSymbolSnafu {
                    rank: merge.rank,
                    id: merge.merged,
                })?;

            let actual = crate::bpe::merge_bytes(bytes, &self.byte_tokens, &self.merges);
            ensure!(
                actual == [merge.merged],
                error::IrreproducibleSnafu {
                    token: merge.merged,
                    actual
                }
            );
        }

        Ok(())
    }
}

impl fmt::Debug for VocabularyTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VocabularyTable")
            .field("tokens", &self.len())
            .field("merges", &self.num_merges())
            .field("special_tokens", &self.special_ids.len())
            .field("mean_token_len", &self.mean_token_len)
            .finish()
    }
}

/// Incrementally builds a [`VocabularyTable`], rejecting inconsistent input as soon as it shows
/// up.
///
/// Tokens must be added before the merges that reference them, and merges must be added in
/// strictly increasing rank order.
pub struct VocabularyBuilder {
    encoder: TokenEncoder,
    decoder: TokenDecoder,
    ranks: HashMap<TokenInt, Rank>,
    merges: MergeTable,
    merge_order: Vec<Merge>,
    byte_tokens: [Option<TokenInt>; 256],
    special_encoder: TokenEncoder,
    special_decoder: TokenDecoder,
    special_ids: Vec<TokenInt>,
}

impl Default for VocabularyBuilder {
    fn default() -> Self {
        Self {
            encoder: TokenEncoder::default(),
            decoder: TokenDecoder::default(),
            ranks: HashMap::default(),
            merges: MergeTable::default(),
            merge_order: Vec::new(),
            byte_tokens: [None; 256],
            special_encoder: TokenEncoder::default(),
            special_decoder: TokenDecoder::default(),
            special_ids: Vec::new(),
        }
    }
}

impl VocabularyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_token(
        &mut self,
        id: TokenInt,
        bytes: impl Into<TokenString>,
    ) -> Result<(), VocabError> {
        let bytes = bytes.into();

        ensure!(!bytes.is_empty(), error::EmptyTokenSnafu { id });
        self.ensure_unused(id, &bytes)?;

        if let [byte] = bytes.as_slice() {
            self.byte_tokens[*byte as usize] = Some(id);
        }
        self.encoder.insert(bytes.clone(), id);
        self.decoder.insert(id, bytes);

        Ok(())
    }

    /// Add the rule merging `left` followed by `right`, returning the id of the merged token.
    pub fn add_merge(
        &mut self,
        rank: Rank,
        left: TokenInt,
        right: TokenInt,
    ) -> Result<TokenInt, VocabError> {
        if let Some(previous) = self.merge_order.last().map(|m| m.rank) {
            ensure!(
                rank > previous,
                error::RankOutOfOrderSnafu { rank, previous }
            );
        }

        let left_bytes = self
            .decoder
            .bytes_for_token(left)
            .context(error::UnknownSymbolSnafu { rank, id: left })?;
        let right_bytes = self
            .decoder
            .bytes_for_token(right)
            .context(error::UnknownSymbolSnafu { rank, id: right })?;

        let mut bytes = Vec::with_capacity(left_bytes.len() + right_bytes.len());
        bytes.extend_from_slice(left_bytes);
        bytes.extend_from_slice(right_bytes);

        let merged = match self.encoder.token_for_bytes(&bytes) {
            Some(merged) => merged,
            None => return error::MissingMergeTargetSnafu { rank, bytes }.fail(),
        };

        if let Some(first) = self.ranks.get(&merged) {
            return error::DuplicateMergeSnafu {
                token: merged,
                first: *first,
                second: rank,
            }
            .fail();
        }

        let merge = Merge {
            rank,
            left,
            right,
            merged,
        };
        self.ranks.insert(merged, rank);
        self.merges.insert(merge);
        self.merge_order.push(merge);

        Ok(merged)
    }

    pub fn add_special(
        &mut self,
        id: TokenInt,
        bytes: impl Into<TokenString>,
    ) -> Result<(), VocabError> {
        let bytes = bytes.into();

        ensure!(!bytes.is_empty(), error::EmptyTokenSnafu { id });
        self.ensure_unused(id, &bytes)?;

        self.special_encoder.insert(bytes.clone(), id);
        self.special_decoder.insert(id, bytes);
        self.special_ids.push(id);

        Ok(())
    }

    pub fn token_for_bytes(&self, bytes: impl AsRef<[u8]>) -> Option<TokenInt> {
        self.encoder.token_for_bytes(bytes)
    }

    /// Run the merge loop over `bytes` using only the merges added so far.
    pub(crate) fn merge_with_current_rules(
        &self,
        bytes: &[u8],
        byte_tokens: &[TokenInt; 256],
    ) -> Vec<TokenInt> {
        crate::bpe::merge_bytes(bytes, byte_tokens, &self.merges)
    }

    /// The single-byte table, failing if any byte value has no token.
    pub(crate) fn byte_table(&self) -> Result<[TokenInt; 256], VocabError> {
        let mut table = [0; 256];
        for (byte, slot) in self.byte_tokens.iter().enumerate() {
            table[byte] = (*slot).context(error::UnencodableByteSnafu { byte: byte as u8 })?;
        }

        Ok(table)
    }

    pub fn finish(mut self) -> Result<VocabularyTable, VocabError> {
        let byte_tokens = self.byte_table()?;

        let total_len = self.encoder.tokens().map(|(bytes, _)| bytes.len()).sum::<usize>();
        let mean_token_len = (total_len / self.encoder.len().max(1)).max(1);

        self.special_ids.sort_unstable();

        Ok(VocabularyTable {
            encoder: self.encoder,
            decoder: self.decoder,
            ranks: self.ranks,
            merges: self.merges,
            merge_order: self.merge_order,
            byte_tokens,
            special_encoder: self.special_encoder,
            special_decoder: self.special_decoder,
            special_ids: self.special_ids,
            mean_token_len,
        })
    }

    /// Ordinary and special tokens share one id space and one byte-sequence space.
    fn ensure_unused(&self, id: TokenInt, bytes: &[u8]) -> Result<(), VocabError> {
        ensure!(
            !self.decoder.contains(id) && !self.special_decoder.contains(id),
            error::DuplicateIdSnafu { id }
        );

        if let Some(first) = self
            .encoder
            .token_for_bytes(bytes)
            .or_else(|| self.special_encoder.token_for_bytes(bytes))
        {
            return error::DuplicateBytesSnafu {
                bytes: bytes.to_vec(),
                first,
                second: id,
            }
            .fail();
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use assert_matches::assert_matches;

    /// A builder with all 256 single-byte tokens, where each byte's id is the byte value
    pub(crate) fn byte_level_builder() -> VocabularyBuilder {
        let mut builder = VocabularyBuilder::new();
        for byte in 0..=255u8 {
            builder.add_token(byte as TokenInt, vec![byte]).unwrap();
        }
        builder
    }

    #[test]
    fn builds_and_looks_up() {
        let mut builder = byte_level_builder();
        builder.add_token(256, "ab").unwrap();
        builder.add_token(257, "abc").unwrap();
        assert_eq!(256, builder.add_merge(0, b'a' as TokenInt, b'b' as TokenInt).unwrap());
        assert_eq!(257, builder.add_merge(1, 256, b'c' as TokenInt).unwrap());
        builder.add_special(258, "<|end|>").unwrap();
        let vocab = builder.finish().unwrap();

        assert_eq!(258, vocab.len());
        assert_eq!(2, vocab.num_merges());
        assert_eq!(
            Some(TokenEntry { id: 257, rank: Some(1) }),
            vocab.lookup("abc")
        );
        assert_eq!(Some(TokenEntry { id: 97, rank: None }), vocab.lookup("a"));
        assert_eq!(Some(b"ab".as_slice()), vocab.bytes_for_token(256));
        assert_eq!(None, vocab.bytes_for_token(258));
        assert_eq!(Some(b"<|end|>".as_slice()), vocab.decode_token(258));
        assert_eq!(Some(7), vocab.token_len(258));
        assert_eq!(Some(258), vocab.special_token_for_bytes("<|end|>"));
        assert!(vocab.is_special(258));
        assert_eq!(Some(257), vocab.merge(256, b'c' as TokenInt).map(|m| m.merged));
        assert_eq!(None, vocab.merge(b'b' as TokenInt, b'c' as TokenInt));
        vocab.verify_merges().unwrap();
    }

    #[test]
    fn detects_tokens_without_a_merge() {
        // "ab" is a token, but nothing merges 'a' and 'b', so it only shows up when a chunk is
        // exactly "ab" and never inside a longer one
        let mut builder = byte_level_builder();
        builder.add_token(256, "ab").unwrap();
        builder.add_token(257, "cd").unwrap();
        builder.add_merge(0, b'c' as TokenInt, b'd' as TokenInt).unwrap();
        let vocab = builder.finish().unwrap();

        assert_eq!(vec![97, 98], crate::bpe::byte_pair_encode(b"ab", &vocab));
        assert_matches!(
            vocab.verify_merges(),
            Err(VocabError::Unreachable { token: 256 })
        );
    }

    #[test]
    fn rejects_duplicate_ids_and_bytes() {
        let mut builder = byte_level_builder();
        assert_matches!(
            builder.add_token(5, "xy"),
            Err(VocabError::DuplicateId { id: 5 })
        );
        assert_matches!(
            builder.add_token(300, "x"),
            Err(VocabError::DuplicateBytes { first, second: 300, .. }) if first == b'x' as TokenInt
        );
        assert_matches!(
            builder.add_special(65, "<|end|>"),
            Err(VocabError::DuplicateId { id: 65 })
        );
        assert_matches!(builder.add_token(300, ""), Err(VocabError::EmptyToken { id: 300 }));
    }

    #[test]
    fn rejects_bad_merges() {
        let mut builder = byte_level_builder();
        builder.add_token(256, "ab").unwrap();
        builder.add_token(257, "cd").unwrap();

        assert_matches!(
            builder.add_merge(0, 999, b'b' as TokenInt),
            Err(VocabError::UnknownSymbol { rank: 0, id: 999 })
        );
        assert_matches!(
            builder.add_merge(0, b'x' as TokenInt, b'y' as TokenInt),
            Err(VocabError::MissingMergeTarget { rank: 0, .. })
        );

        builder.add_merge(5, b'c' as TokenInt, b'd' as TokenInt).unwrap();
        assert_matches!(
            builder.add_merge(5, b'a' as TokenInt, b'b' as TokenInt),
            Err(VocabError::RankOutOfOrder { rank: 5, previous: 5 })
        );
        assert_matches!(
            builder.add_merge(6, b'c' as TokenInt, b'd' as TokenInt),
            Err(VocabError::DuplicateMerge { token: 257, first: 5, second: 6 })
        );
    }

    #[test]
    fn rejects_missing_bytes() {
        let mut builder = VocabularyBuilder::new();
        for byte in 0..=254u8 {
            builder.add_token(byte as TokenInt, vec![byte]).unwrap();
        }
        assert_matches!(
            builder.finish(),
            Err(VocabError::UnencodableByte { byte: 255 })
        );
    }

    #[test]
    fn detects_irreproducible_merges() {
        // "abc" is declared as ("ab", "c"), but "bc" has the lower rank so the bytes "abc" merge
        // into "a" + "bc" and never reach the declared token.
        let mut builder = byte_level_builder();
        builder.add_token(256, "bc").unwrap();
        builder.add_token(257, "ab").unwrap();
        builder.add_token(258, "abc").unwrap();
        builder.add_merge(0, b'b' as TokenInt, b'c' as TokenInt).unwrap();
        builder.add_merge(1, b'a' as TokenInt, b'b' as TokenInt).unwrap();
        builder.add_merge(2, 257, b'c' as TokenInt).unwrap();
        let vocab = builder.finish().unwrap();

        assert_matches!(
            vocab.verify_merges(),
            Err(VocabError::Irreproducible { token: 258, .. })
        );
    }
}

//! The lookup tables behind a vocabulary.  The hash function used here has a big impact on
//! encode performance, since every merge step does a pair lookup.
//!
//! This is isolated to this module to make it easier to experiment with different impls.
use crate::token::{Merge, TokenInt, TokenString};

pub use rustc_hash::FxHashMap as HashMap;

/// Maps byte sequences to the id assigned to them in the vocabulary.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenEncoder(HashMap<TokenString, TokenInt>);

/// The reverse mapping, from the integer id of the token to the corresponding byte sequence.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenDecoder(HashMap<TokenInt, TokenString>);

/// Merge rules keyed by the adjacent pair of token ids they apply to.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MergeTable(HashMap<(TokenInt, TokenInt), Merge>);

impl TokenEncoder {
    pub fn token_for_bytes(&self, bytes: impl AsRef<[u8]>) -> Option<TokenInt> {
        self.0.get(bytes.as_ref()).copied()
    }

    pub(crate) fn insert(&mut self, bytes: TokenString, token: TokenInt) {
        self.0.insert(bytes, token);
    }

    /// All of the string/int pairs, in no particular order
    pub fn tokens(&self) -> impl Iterator<Item = (&TokenString, TokenInt)> {
        self.0.iter().map(|(s, i)| (s, *i))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl TokenDecoder {
    pub fn bytes_for_token(&self, token: TokenInt) -> Option<&TokenString> {
        self.0.get(&token)
    }

    /// Without actually decoding this token int, return the length of the corresponding byte
    /// sequence.
    pub fn token_len(&self, token: TokenInt) -> Option<usize> {
        self.bytes_for_token(token).map(TokenString::len)
    }

    pub(crate) fn insert(&mut self, token: TokenInt, bytes: TokenString) {
        self.0.insert(token, bytes);
    }

    pub fn contains(&self, token: TokenInt) -> bool {
        self.0.contains_key(&token)
    }
}

impl MergeTable {
    #[inline]
    pub fn get(&self, left: TokenInt, right: TokenInt) -> Option<&Merge> {
        self.0.get(&(left, right))
    }

    pub(crate) fn insert(&mut self, merge: Merge) {
        self.0.insert((merge.left, merge.right), merge);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

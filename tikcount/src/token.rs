/// A token output by the tokenizer, represented by its integer id in the encoding's vocabulary.
///
/// Ids are what get fed into models and what get counted.  Every ordinary token id maps to
/// exactly one byte sequence ([`TokenString`]) and vice versa.  Special tokens share the same id
/// space but are never produced by the merge loop.
pub type TokenInt = usize;

/// A token produced by the tokenizer, represented in its byte string form.
///
/// Callers are usually interested in the integer form, but the vocabulary needs the byte form
/// to look tokens up while merging, and to decode ids back into text.
pub type TokenString = Vec<u8>;

/// Priority of a merge rule.  Lower ranks are merged first.
pub type Rank = u32;

/// A token's id together with the rank of the merge that produces it.
///
/// Single-byte tokens are not produced by any merge, so their `rank` is `None`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TokenEntry {
    pub id: TokenInt,
    pub rank: Option<Rank>,
}

/// One merge rule: the adjacent pair `(left, right)` becomes `merged` at priority `rank`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Merge {
    pub rank: Rank,
    pub left: TokenInt,
    pub right: TokenInt,
    pub merged: TokenInt,
}

//! The byte pair merge loop, which turns one pretokenized chunk into tokens.
use crate::token::{Merge, TokenInt};
use crate::vocab::{MergeTable, VocabularyTable};

/// Using the BPE algorithm find the tokens in a chunk and return their integer form.
pub fn byte_pair_encode(piece: &[u8], vocab: &VocabularyTable) -> Vec<TokenInt> {
    merge_bytes(piece, vocab.byte_tokens(), vocab.merge_table())
}

/// Like [`byte_pair_encode`] but only returns how many tokens there are.
pub fn byte_pair_count(piece: &[u8], vocab: &VocabularyTable) -> usize {
    // A single byte is always exactly one token
    if piece.len() <= 1 {
        return piece.len();
    }

    byte_pair_merge(piece, vocab.byte_tokens(), vocab.merge_table()).len()
}

/// Using the BPE algorithm, find the tokens in a chunk and return their byte string form.
pub fn byte_pair_split<'a>(piece: &'a [u8], vocab: &VocabularyTable) -> Vec<&'a [u8]> {
    let parts = byte_pair_merge(piece, vocab.byte_tokens(), vocab.merge_table());

    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let end = parts.get(i + 1).map_or(piece.len(), |next| next.start);
            &piece[part.start..end]
        })
        .collect()
}

/// Merge loop over raw tables, so vocabularies can be checked while they're still being built.
pub(crate) fn merge_bytes(
    piece: &[u8],
    byte_tokens: &[TokenInt; 256],
    merges: &MergeTable,
) -> Vec<TokenInt> {
    byte_pair_merge(piece, byte_tokens, merges)
        .into_iter()
        .map(|part| part.token)
        .collect()
}

/// One symbol of the chunk being merged.
#[derive(Clone, Copy, Debug)]
struct Part {
    /// Offset into the chunk where this symbol starts
    start: usize,

    token: TokenInt,

    /// The merge rule that applies to this symbol and the one after it, if any
    pair: Option<Merge>,
}

/// Merge symbols within a chunk together into progressively fewer, longer symbols.
///
/// Starts from one symbol per byte.  Each step merges the adjacent pair whose rule has the
/// lowest rank; when the same rule applies in several places the leftmost one goes first.  Stops
/// when no adjacent pair has a rule.
fn byte_pair_merge(
    piece: &[u8],
    byte_tokens: &[TokenInt; 256],
    merges: &MergeTable,
) -> Vec<Part> {
    let pair = |left: TokenInt, right: TokenInt| merges.get(left, right).copied();

    let mut parts: Vec<Part> = piece
        .iter()
        .enumerate()
        .map(|(start, byte)| Part {
            start,
            token: byte_tokens[*byte as usize],
            pair: None,
        })
        .collect();

    // Look up the pair rules once in the beginning and then only update the two neighbours of
    // each merge, which keeps the number of lookups linear in the number of merges.
    for i in 0..parts.len().saturating_sub(1) {
        parts[i].pair = pair(parts[i].token, parts[i + 1].token);
    }

    // With n parts and m merges this does O(mn) work.  A heap would get that down to
    // O(m log n), but chunks are short (usually < 100 bytes) and a linear scan over a flat vector
    // wins on cache locality at that size.
    loop {
        let best = parts
            .iter()
            .enumerate()
            .filter_map(|(i, part)| part.pair.map(|merge| (merge.rank, i, merge.merged)))
            .min();

        let (i, merged) = match best {
            Some((_, i, merged)) => (i, merged),
            None => break,
        };

        parts[i].token = merged;
        parts.remove(i + 1);

        let next = parts.get(i + 1).map(|part| part.token);
        parts[i].pair = next.and_then(|next| pair(merged, next));
        if i > 0 {
            parts[i - 1].pair = pair(parts[i - 1].token, merged);
        }
    }

    parts
}

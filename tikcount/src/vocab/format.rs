//! Reading and writing vocabulary files.
//!
//! Two formats are understood:
//!
//! - The native `.bpe` format, which spells out every token, every merge rule and every special
//!   token explicitly:
//!
//!   ```text
//!   # comments and blank lines are ignored
//!   token <id> <base64 bytes>
//!   merge <rank> <left id> <right id>
//!   special <id> <base64 bytes>
//!   ```
//!
//!   Tokens must come before the merges that use them, and merge ranks must strictly increase.
//!   [`write_bpe`] produces exactly what [`parse_bpe`] reads back.
//!
//! - The `.tiktoken` format published with OpenAI's encodings: one `<base64 bytes> <rank>` per
//!   line, where the rank doubles as the token id.  Merge rules are not stored in these files, so
//!   they are recovered from the ranks (see [`parse_tiktoken`]).
use super::{VocabularyBuilder, VocabularyTable};
use crate::error::{self, VocabError};
use crate::token::{Rank, TokenInt};
use base64::{engine::general_purpose, Engine as _};
use snafu::{OptionExt, ResultExt};
use std::io::Write;
use std::str::{FromStr, SplitAsciiWhitespace};
use tracing::*;

/// Parse a vocabulary in the native `.bpe` format.
///
/// On top of the structural checks done by [`VocabularyBuilder`], every merge is checked with
/// [`VocabularyTable::verify_merges`].
pub fn parse_bpe(text: &str) -> Result<VocabularyTable, VocabError> {
    let mut builder = VocabularyBuilder::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let mut fields = line.split_ascii_whitespace();
        match fields.next().unwrap_or_default() {
            "token" => {
                let id = field::<TokenInt>(&mut fields, line_no, "token id")?;
                let bytes = base64_field(&mut fields, line_no)?;
                end_of_line(fields, line_no)?;
                builder.add_token(id, bytes)?;
            }
            "merge" => {
                let rank = field::<Rank>(&mut fields, line_no, "merge rank")?;
                let left = field::<TokenInt>(&mut fields, line_no, "left token id")?;
                let right = field::<TokenInt>(&mut fields, line_no, "right token id")?;
                end_of_line(fields, line_no)?;
                builder.add_merge(rank, left, right)?;
            }
            "special" => {
                let id = field::<TokenInt>(&mut fields, line_no, "special token id")?;
                let bytes = base64_field(&mut fields, line_no)?;
                end_of_line(fields, line_no)?;
                builder.add_special(id, bytes)?;
            }
            other => {
                return error::MalformedSnafu {
                    line: line_no,
                    message: format!("unknown directive '{other}'"),
                }
                .fail()
            }
        }
    }

    let vocab = builder.finish()?;
    vocab.verify_merges()?;

    debug!(
        tokens = vocab.len(),
        merges = vocab.num_merges(),
        "Parsed BPE vocabulary"
    );

    Ok(vocab)
}

/// Write `vocab` in the native `.bpe` format.
pub fn write_bpe(vocab: &VocabularyTable, mut writer: impl Write) -> std::io::Result<()> {
    let special_tokens = vocab.special_tokens().collect::<Vec<_>>();

    writeln!(
        writer,
        "# {} tokens, {} merges, {} special tokens",
        vocab.len(),
        vocab.num_merges(),
        special_tokens.len()
    )?;

    let mut tokens = vocab.tokens().collect::<Vec<_>>();
    tokens.sort_unstable_by_key(|(_, id)| *id);
    for (bytes, id) in tokens {
        writeln!(writer, "token {id} {}", general_purpose::STANDARD.encode(bytes))?;
    }

    for merge in vocab.merges() {
        writeln!(writer, "merge {} {} {}", merge.rank, merge.left, merge.right)?;
    }

    for (bytes, id) in special_tokens {
        writeln!(writer, "special {id} {}", general_purpose::STANDARD.encode(bytes))?;
    }

    Ok(())
}

/// Parse a vocabulary in the `.tiktoken` format, adding `special_tokens` to it.
///
/// Merge rules are recovered by visiting the tokens in rank order and running the merge loop
/// over each multi-byte token's bytes with the rules recovered so far.  If that yields exactly
/// two symbols, they become the rule that produces the token, at the token's rank.  Tokens for
/// which that doesn't work are kept, but the merge loop can never produce them; they are only
/// ever emitted when a whole chunk matches them.
pub fn parse_tiktoken<'a>(
    text: &str,
    special_tokens: impl IntoIterator<Item = (&'a str, TokenInt)>,
) -> Result<VocabularyTable, VocabError> {
    let mut entries = Vec::new();

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        // Each line is of the form "<base64 string> <rank>"
        let (bytes, rank) = line.split_once(' ').context(error::MalformedSnafu {
            line: line_no,
            message: "expected '<base64> <rank>'",
        })?;

        let bytes = general_purpose::STANDARD
            .decode(bytes)
            .context(error::Base64Snafu { line: line_no })?;
        let rank = rank
            .trim()
            .parse::<Rank>()
            .ok()
            .with_context(|| error::MalformedSnafu {
                line: line_no,
                message: format!("invalid rank '{rank}'"),
            })?;

        entries.push((rank, bytes));
    }

    entries.sort_unstable_by_key(|(rank, _)| *rank);

    let mut builder = VocabularyBuilder::new();
    for (rank, bytes) in &entries {
        builder.add_token(*rank as TokenInt, bytes.clone())?;
    }

    let byte_tokens = builder.byte_table()?;
    let mut unrecoverable = 0usize;
    for (rank, bytes) in entries.iter().filter(|(_, bytes)| bytes.len() > 1) {
        match builder.merge_with_current_rules(bytes, &byte_tokens).as_slice() {
            [left, right] => {
                builder.add_merge(*rank, *left, *right)?;
            }
            _ => unrecoverable += 1,
        }
    }

    for (bytes, id) in special_tokens {
        builder.add_special(id, bytes.as_bytes())?;
    }

    let vocab = builder.finish()?;

    debug!(
        tokens = vocab.len(),
        merges = vocab.num_merges(),
        unrecoverable,
        "Parsed tiktoken vocabulary"
    );

    Ok(vocab)
}

fn field<T: FromStr>(
    fields: &mut SplitAsciiWhitespace<'_>,
    line: usize,
    what: &str,
) -> Result<T, VocabError> {
    let value = fields.next().with_context(|| error::MalformedSnafu {
        line,
        message: format!("missing {what}"),
    })?;

    value.parse().ok().with_context(|| error::MalformedSnafu {
        line,
        message: format!("invalid {what} '{value}'"),
    })
}

fn base64_field(
    fields: &mut SplitAsciiWhitespace<'_>,
    line: usize,
) -> Result<Vec<u8>, VocabError> {
    let value = fields.next().context(error::MalformedSnafu {
        line,
        message: "missing token bytes",
    })?;

    general_purpose::STANDARD
        .decode(value)
        .context(error::Base64Snafu { line })
}

fn end_of_line(mut fields: SplitAsciiWhitespace<'_>, line: usize) -> Result<(), VocabError> {
    match fields.next() {
        Some(extra) => error::MalformedSnafu {
            line,
            message: format!("unexpected trailing field '{extra}'"),
        }
        .fail(),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const NO_SPECIALS: [(&str, TokenInt); 0] = [];

    fn byte_lines() -> String {
        (0..=255u8)
            .map(|byte| format!("token {byte} {}\n", general_purpose::STANDARD.encode([byte])))
            .collect()
    }

    fn tiktoken_byte_lines() -> String {
        (0..=255u8)
            .map(|byte| format!("{} {byte}\n", general_purpose::STANDARD.encode([byte])))
            .collect()
    }

    #[test]
    fn parses_bpe() {
        let text = format!(
            "# a comment\n\n{}token 256 aGk=\ntoken 257 aGkh\nmerge 0 104 105\nmerge 1 256 33\nspecial 258 PHxlbmR8Pg==\n",
            byte_lines()
        );

        let vocab = parse_bpe(&text).unwrap();
        assert_eq!(258, vocab.len());
        assert_eq!(Some(256), vocab.token_for_bytes("hi"));
        assert_eq!(Some(257), vocab.token_for_bytes("hi!"));
        assert_eq!(Some(1), vocab.rank_of(257));
        assert_eq!(Some(258), vocab.special_token_for_bytes("<|end|>"));
    }

    #[test]
    fn write_then_parse_is_lossless() {
        let text = format!(
            "{}token 256 aGk=\ntoken 257 aGkh\nmerge 3 104 105\nmerge 7 256 33\nspecial 300 PHxlbmR8Pg==\n",
            byte_lines()
        );
        let vocab = parse_bpe(&text).unwrap();

        let mut written = Vec::new();
        write_bpe(&vocab, &mut written).unwrap();
        let reparsed = parse_bpe(std::str::from_utf8(&written).unwrap()).unwrap();

        assert_eq!(vocab, reparsed);
    }

    #[test]
    fn rejects_malformed_lines() {
        assert_matches!(
            parse_bpe("token 1\n"),
            Err(VocabError::Malformed { line: 1, .. })
        );
        assert_matches!(
            parse_bpe("# header\ntoken x AA==\n"),
            Err(VocabError::Malformed { line: 2, .. })
        );
        assert_matches!(
            parse_bpe("token 0 AA== extra\n"),
            Err(VocabError::Malformed { line: 1, .. })
        );
        assert_matches!(
            parse_bpe("frobnicate 1 2\n"),
            Err(VocabError::Malformed { line: 1, .. })
        );
        assert_matches!(
            parse_bpe("token 0 !!!\n"),
            Err(VocabError::Base64 { line: 1, .. })
        );
    }

    #[test]
    fn rejects_inconsistent_vocabularies() {
        let bytes = byte_lines();

        assert_matches!(
            parse_bpe(&format!("{bytes}token 65 aGk=\n")),
            Err(VocabError::DuplicateId { id: 65 })
        );
        assert_matches!(
            parse_bpe(&format!("{bytes}token 256 aGk=\nmerge 0 104 999\n")),
            Err(VocabError::UnknownSymbol { rank: 0, id: 999 })
        );
        assert_matches!(
            parse_bpe(&format!(
                "{bytes}token 256 aGk=\ntoken 257 aGkh\nmerge 4 104 105\nmerge 2 256 33\n"
            )),
            Err(VocabError::RankOutOfOrder { rank: 2, previous: 4 })
        );
        assert_matches!(
            parse_bpe("token 0 AA==\n"),
            Err(VocabError::UnencodableByte { byte: 1 })
        );
        assert_matches!(
            parse_bpe(&format!("{bytes}token 256 YWI=\n")),
            Err(VocabError::Unreachable { token: 256 })
        );
    }

    #[test]
    fn recovers_tiktoken_merges() {
        // "hi" = 256, "hi!" = 257, and "xyz" = 258 which can't be built from two existing tokens
        let text = format!("{}aGk= 256\naGkh 257\neHl6 258\n", tiktoken_byte_lines());

        let vocab = parse_tiktoken(&text, [("<|endoftext|>", 259)]).unwrap();
        assert_eq!(259, vocab.len());
        assert_eq!(2, vocab.num_merges());
        assert_eq!(Some(256), vocab.merge(104, 105).map(|m| m.merged));
        assert_eq!(Some(257), vocab.merge(256, 33).map(|m| m.merged));
        assert_eq!(None, vocab.rank_of(258));
        assert_eq!(Some(259), vocab.special_token_for_bytes("<|endoftext|>"));

        // Unrecoverable tokens are kept, even though a `.bpe` file couldn't declare them
        assert_matches!(
            vocab.verify_merges(),
            Err(VocabError::Unreachable { token: 258 })
        );
    }

    #[test]
    fn rejects_malformed_tiktoken() {
        assert_matches!(
            parse_tiktoken("AA==\n", NO_SPECIALS),
            Err(VocabError::Malformed { line: 1, .. })
        );
        assert_matches!(
            parse_tiktoken("AA== zero\n", NO_SPECIALS),
            Err(VocabError::Malformed { line: 1, .. })
        );
        assert_matches!(
            parse_tiktoken("AA== 0\nAA== 1\n", NO_SPECIALS),
            Err(VocabError::DuplicateBytes { first: 0, second: 1, .. })
        );
    }
}

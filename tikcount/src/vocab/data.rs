//! tikcount embeds the `gpt2-like` vocabulary into the Rust binary in release builds.  In debug
//! builds the file is simply loaded from the crate's `vocab/` directory for a faster experience
//! while iteratively developing.
//!
//! The OpenAI vocabularies are far too big to embed, so they are read from a directory named in
//! the [`Config`].  That directory can also hold a `.bpe` file that replaces an embedded
//! vocabulary of the same name.
use super::{format, VocabularyTable};
use crate::config::Config;
use crate::error::{self, InitError};
use crate::token::TokenInt;
use rust_embed::RustEmbed;
use snafu::ResultExt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::*;

#[derive(RustEmbed)]
#[folder = "vocab"]
struct EmbeddedVocab;

/// Where the vocabulary of an encoding comes from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VocabSource {
    /// A `.bpe` file compiled into the crate, which may be overridden by a file of the same name
    /// in the vocabulary directory
    Embedded(&'static str),

    /// A `.tiktoken` file that must be present in the vocabulary directory
    Tiktoken(&'static str),
}

/// Load and validate the vocabulary for the encoding called `encoding`.
pub(crate) fn load_vocabulary(
    encoding: &str,
    source: VocabSource,
    special_tokens: &[(&'static str, TokenInt)],
    config: &Config,
) -> Result<VocabularyTable, InitError> {
    match source {
        VocabSource::Embedded(file) => {
            let vocab = match override_path(config, file) {
                Some(path) => {
                    debug!(path = %path.display(), "Loading vocabulary from vocabulary directory");
                    format::parse_bpe(&read_file(&path)?)
                }
                None => {
                    let data = EmbeddedVocab::get(file)
                        .expect("BUG: Required embedded vocabulary is missing");
                    std::str::from_utf8(data.data.as_ref())
                        .context(error::NotUtf8Snafu)
                        .and_then(format::parse_bpe)
                }
            };

            vocab.context(error::CorruptVocabularySnafu { encoding })
        }
        VocabSource::Tiktoken(file) => {
            let dir = match config.vocab_dir.as_deref() {
                Some(dir) => dir,
                None => {
                    return Err(InitError::Io {
                        path: PathBuf::from(file),
                        source: io::Error::new(
                            io::ErrorKind::NotFound,
                            "no vocabulary directory configured",
                        ),
                    })
                }
            };
            let path = dir.join(file);

            debug!(path = %path.display(), "Loading tiktoken vocabulary");
            let text = read_file(&path)?;

            format::parse_tiktoken(&text, special_tokens.iter().copied())
                .context(error::CorruptVocabularySnafu { encoding })
        }
    }
}

fn override_path(config: &Config, file: &str) -> Option<PathBuf> {
    let path = config.vocab_dir.as_ref()?.join(file);
    path.is_file().then_some(path)
}

fn read_file(path: &Path) -> Result<String, InitError> {
    std::fs::read_to_string(path).context(error::IoSnafu { path })
}

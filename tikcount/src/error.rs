use crate::session::SessionStatus;
use crate::{Rank, TokenInt, TokenString};
use snafu::Snafu;
use std::path::PathBuf;

/// Errors setting up a session or loading an encoding.
///
/// These are fatal for the session they occurred in; the session is left in the state it was in
/// before the failed `init`.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum InitError {
    #[snafu(display("The encoding '{encoding}' isn't one of the supported encodings"))]
    UnknownEncoding { encoding: String },

    #[snafu(display("The vocabulary for encoding '{encoding}' is corrupt: {source}"))]
    CorruptVocabulary {
        encoding: String,
        source: VocabError,
    },

    #[snafu(display("File I/O error on file '{}'", path.display()))]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display(
        "The session is already initialized with encoding '{encoding}'; call cleanup first"
    ))]
    AlreadyInitialized { encoding: String },
}

/// Errors from calling `count` or `encode` on a session that can't serve them.
///
/// This is always caller misuse: fix the call order rather than retrying.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum CountError {
    #[snafu(display("The tokenizer session is {status}, not ready"))]
    SessionNotReady { status: SessionStatus },
}

/// Integrity violations found while parsing or building a vocabulary.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum VocabError {
    #[snafu(display("Vocabulary data is not valid UTF-8"))]
    NotUtf8 { source: std::str::Utf8Error },

    #[snafu(display("Line {line}: {message}"))]
    Malformed { line: usize, message: String },

    #[snafu(display("Line {line}: invalid base64 token bytes"))]
    Base64 {
        line: usize,
        source: base64::DecodeError,
    },

    #[snafu(display("Token id {id} is defined more than once"))]
    DuplicateId { id: TokenInt },

    #[snafu(display("Byte sequence {bytes:?} is assigned to both token {first} and token {second}"))]
    DuplicateBytes {
        bytes: TokenString,
        first: TokenInt,
        second: TokenInt,
    },

    #[snafu(display("Token {id} has an empty byte sequence"))]
    EmptyToken { id: TokenInt },

    #[snafu(display("Merge rank {rank} follows rank {previous}; ranks must strictly increase"))]
    RankOutOfOrder { rank: Rank, previous: Rank },

    #[snafu(display("Merge rank {rank} references unknown token {id}"))]
    UnknownSymbol { rank: Rank, id: TokenInt },

    #[snafu(display("Merge rank {rank} produces {bytes:?}, which is not a token"))]
    MissingMergeTarget { rank: Rank, bytes: TokenString },

    #[snafu(display("Token {token} is produced by both merge rank {first} and merge rank {second}"))]
    DuplicateMerge {
        token: TokenInt,
        first: Rank,
        second: Rank,
    },

    #[snafu(display("Byte {byte:#04x} has no single-byte token"))]
    UnencodableByte { byte: u8 },

    #[snafu(display("Token {token} has more than one byte but no merge rule produces it"))]
    Unreachable { token: TokenInt },

    #[snafu(display("Token {token} is not reproduced by encoding its own bytes (got {actual:?})"))]
    Irreproducible {
        token: TokenInt,
        actual: Vec<TokenInt>,
    },
}

/// Errors turning token ids back into bytes or text.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum DecodeError {
    #[snafu(display("Token {token} isn't used by this encoding"))]
    UnknownToken { token: TokenInt },

    #[snafu(display("The decoded tokens are not valid UTF-8"))]
    InvalidUtf8 { source: std::string::FromUtf8Error },
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("Error reading config file '{}'", path.display()))]
    ReadConfig {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Error parsing config"))]
    ParseConfig { source: serde_json::Error },

    #[snafu(display("Environment variable {name} has invalid value '{value}'"))]
    InvalidEnvVar { name: &'static str, value: String },
}

//! Runtime configuration for loading encodings.
use crate::error::{self, ConfigError};
use serde::{Deserialize, Serialize};
use snafu::{OptionExt, ResultExt};
use std::path::{Path, PathBuf};

/// Environment variable naming the directory that holds vocabulary files
pub const VOCAB_DIR_ENV: &str = "TIKCOUNT_VOCAB_DIR";

/// Environment variable setting [`Config::cache_capacity`]
pub const CACHE_CAPACITY_ENV: &str = "TIKCOUNT_CACHE_CAPACITY";

/// Settings that control where vocabularies come from and how encodings behave once loaded.
///
/// The defaults need no files at all: only the embedded `gpt2-like` encoding is available, and
/// the chunk cache is off.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Directory holding `.tiktoken` vocabulary files, and `.bpe` files that replace embedded
    /// vocabularies of the same name
    pub vocab_dir: Option<PathBuf>,

    /// Maximum number of chunks whose tokens are memoized per loaded encoding.  0 disables the
    /// cache.
    pub cache_capacity: usize,
}

impl Config {
    /// Read the configuration from `TIKCOUNT_VOCAB_DIR` and `TIKCOUNT_CACHE_CAPACITY`, using the
    /// default for any variable that isn't set.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(dir) = std::env::var_os(VOCAB_DIR_ENV) {
            config.vocab_dir = Some(PathBuf::from(dir));
        }

        if let Ok(value) = std::env::var(CACHE_CAPACITY_ENV) {
            config.cache_capacity = value.trim().parse().ok().with_context(|| {
                error::InvalidEnvVarSnafu {
                    name: CACHE_CAPACITY_ENV,
                    value: value.clone(),
                }
            })?;
        }

        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).context(error::ParseConfigSnafu)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json =
            std::fs::read_to_string(path).with_context(|_| error::ReadConfigSnafu { path })?;

        Self::from_json_str(&json)
    }

    pub fn with_vocab_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.vocab_dir = Some(dir.into());
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn parses_json() {
        let config =
            Config::from_json_str(r#"{ "vocab_dir": "/usr/share/tikcount", "cache_capacity": 64 }"#)
                .unwrap();

        assert_eq!(Some(PathBuf::from("/usr/share/tikcount")), config.vocab_dir);
        assert_eq!(64, config.cache_capacity);
    }

    #[test]
    fn missing_fields_use_defaults() {
        assert_eq!(Config::default(), Config::from_json_str("{}").unwrap());
    }

    #[test]
    fn rejects_unknown_fields() {
        assert_matches!(
            Config::from_json_str(r#"{ "vocab_directory": "/tmp" }"#),
            Err(ConfigError::ParseConfig { .. })
        );
    }

    #[test]
    fn reads_environment() {
        // No other test reads these variables
        std::env::set_var(VOCAB_DIR_ENV, "/opt/vocab");
        std::env::set_var(CACHE_CAPACITY_ENV, "128");
        let config = Config::from_env().unwrap();
        assert_eq!(Some(PathBuf::from("/opt/vocab")), config.vocab_dir);
        assert_eq!(128, config.cache_capacity);

        std::env::set_var(CACHE_CAPACITY_ENV, "lots");
        assert_matches!(
            Config::from_env(),
            Err(ConfigError::InvalidEnvVar { value, .. }) if value == "lots"
        );

        std::env::remove_var(VOCAB_DIR_ENV);
        std::env::remove_var(CACHE_CAPACITY_ENV);
        assert_eq!(Config::default(), Config::from_env().unwrap());
    }

    #[test]
    fn reads_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tikcount.json");
        std::fs::write(&path, r#"{ "cache_capacity": 8 }"#).unwrap();

        assert_eq!(
            Config::default().with_cache_capacity(8),
            Config::from_json_file(&path).unwrap()
        );
        assert_matches!(
            Config::from_json_file(dir.path().join("missing.json")),
            Err(ConfigError::ReadConfig { .. })
        );
    }
}

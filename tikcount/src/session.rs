//! The init / count / cleanup lifecycle around a loaded [`Encoding`].
use crate::error::{self, CountError, InitError};
use crate::{Config, Encoding, TokenInt};
use tracing::*;

/// Where a [`Session`] is in its lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum SessionStatus {
    /// No encoding has been loaded yet
    Uninitialized,

    /// An encoding is loaded and text can be counted
    Ready,

    /// The encoding was released by [`Session::cleanup`].  A new `init` makes the session ready
    /// again.
    Closed,
}

enum State {
    Uninitialized,
    Ready(Encoding),
    Closed,
}

/// A tokenizer session that owns at most one loaded encoding.
///
/// Counting and encoding take `&self`, so a ready session can be shared between threads.
/// Loading and releasing the encoding take `&mut self`, which means they can never overlap an
/// in-flight count.
pub struct Session {
    state: State,
    config: Config,
}

impl Session {
    /// A new uninitialized session using the default [`Config`].
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// A new uninitialized session that loads vocabularies according to `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            state: State::Uninitialized,
            config,
        }
    }

    /// Create a session and initialize it with the encoding called `name` in one step.
    pub fn open(name: &str, config: Config) -> Result<Self, InitError> {
        let mut session = Self::with_config(config);
        session.init(name)?;
        Ok(session)
    }

    /// Load the encoding called `name`, making the session ready.
    ///
    /// Fails with [`InitError::AlreadyInitialized`] if an encoding is already loaded.  Any failure
    /// leaves the session in the state it was in before the call.
    pub fn init(&mut self, name: &str) -> Result<(), InitError> {
        if let State::Ready(encoding) = &self.state {
            return error::AlreadyInitializedSnafu {
                encoding: encoding.name(),
            }
            .fail();
        }

        let encoding = Encoding::from_name(name, &self.config)?;
        info!(encoding = name, "Tokenizer session initialized");
        self.state = State::Ready(encoding);

        Ok(())
    }

    /// Count the tokens in `text`, recognizing special tokens.
    pub fn count(&self, text: impl AsRef<str>) -> Result<usize, CountError> {
        Ok(self.encoding()?.count(text))
    }

    /// Encode `text` into token ids, recognizing special tokens.
    pub fn encode(&self, text: impl AsRef<str>) -> Result<Vec<TokenInt>, CountError> {
        Ok(self.encoding()?.encode(text))
    }

    /// The loaded encoding, for decoding and the other operations that [`Encoding`] offers.
    pub fn encoding(&self) -> Result<&Encoding, CountError> {
        match &self.state {
            State::Ready(encoding) => Ok(encoding),
            State::Uninitialized | State::Closed => error::SessionNotReadySnafu {
                status: self.status(),
            }
            .fail(),
        }
    }

    /// Release the loaded encoding.  Does nothing unless the session is ready.
    pub fn cleanup(&mut self) {
        if let State::Ready(encoding) = &self.state {
            debug!(encoding = encoding.name(), "Tokenizer session cleaned up");
            self.state = State::Closed;
        } else {
            debug!(status = %self.status(), "Cleanup of a session that isn't ready; ignoring");
        }
    }

    pub fn status(&self) -> SessionStatus {
        match self.state {
            State::Uninitialized => SessionStatus::Uninitialized,
            State::Ready(_) => SessionStatus::Ready,
            State::Closed => SessionStatus::Closed,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut s = f.debug_struct("Session");
        s.field("status", &self.status());
        if let State::Ready(encoding) = &self.state {
            s.field("encoding", &encoding.name());
        }
        s.finish()
    }
}

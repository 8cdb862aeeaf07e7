//! Error types for asyncd.
//!
//! Errors only ever surface from lifecycle operations (configuring, starting,
//! registering). Dispatch itself never fails: a hook that cannot handle its
//! event returns [`HookResult::Close`](crate::HookResult::Close).
//!
//! - [`ServerError`] - Errors from server lifecycle operations
//! - [`ErrorKind`] - The coarse taxonomy, with a stable numeric code
//! - [`DecodeError`] - Invalid raw event bits or control codes

use std::io;
use thiserror::Error;

/// Coarse classification of a [`ServerError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or out-of-range option value.
    Config,
    /// Listener setup failed.
    Bind,
    /// Operation attempted in the wrong lifecycle phase.
    InvalidState,
    /// I/O failure outside of a connection.
    Transport,
}

impl ErrorKind {
    /// Stable, non-zero code recorded as the server error code.
    pub const fn code(self) -> i32 {
        match self {
            Self::Config => 1,
            Self::Bind => 2,
            Self::InvalidState => 3,
            Self::Transport => 4,
        }
    }
}

/// Errors returned by server lifecycle operations.
#[derive(Error, Debug)]
pub enum ServerError {
    /// An option holds a value that cannot be used.
    #[error("invalid option `{key}` = {value:?}: {reason}")]
    Config {
        /// Option key.
        key: String,
        /// The offending value (empty when the option is unset).
        value: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The listener could not be created.
    #[error("failed to listen on {addr}")]
    Bind {
        /// The address that was being bound.
        addr: String,
        /// Underlying socket error.
        #[source]
        source: io::Error,
    },

    /// The operation is not allowed in the current lifecycle phase.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// An I/O error not tied to a single connection.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
}

impl ServerError {
    /// Shorthand for a [`ServerError::Config`].
    pub fn config(
        key: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            key: key.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// The coarse kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config { .. } => ErrorKind::Config,
            Self::Bind { .. } => ErrorKind::Bind,
            Self::InvalidState(_) => ErrorKind::InvalidState,
            Self::Transport(_) => ErrorKind::Transport,
        }
    }

    /// Stable non-zero code for this error.
    pub fn code(&self) -> i32 {
        self.kind().code()
    }
}

/// Raw values that do not decode into engine types.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Bits that the engine never delivers as one event.
    #[error("invalid event bits {0:#04x}")]
    Event(u16),

    /// Unknown hook control code.
    #[error("invalid hook control code {0}")]
    HookResult(u8),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_non_zero_and_distinct() {
        let kinds = [
            ErrorKind::Config,
            ErrorKind::Bind,
            ErrorKind::InvalidState,
            ErrorKind::Transport,
        ];
        for (i, a) in kinds.iter().enumerate() {
            assert_ne!(a.code(), 0);
            for b in &kinds[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_kind_mapping() {
        let err = ServerError::config("server.port", "abc", "not an integer");
        assert_eq!(err.kind(), ErrorKind::Config);
        assert!(err.to_string().contains("server.port"));

        let err = ServerError::from(io::Error::other("boom"));
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(err.code(), ErrorKind::Transport.code());
    }
}

//! Façade-wide error taxonomy (§7).
//!
//! `NotFound` is deliberately absent from this enum: a missing node is an
//! empty `Option`, not an error. Everything else a façade call can fail with
//! is represented here, shared by every engine, the wire protocol, and the
//! self-healing client.

use thiserror::Error;

/// Errors a façade or engine call can return.
#[derive(Debug, Error)]
pub enum Error {
    /// `set-multi` was given an odd-length flat pair list.
    #[error("set-multi requires an even number of key/value entries, got {0}")]
    InvalidPairs(usize),

    /// The relational engine was constructed with an unrecognized driver tag.
    #[error("unknown relational driver '{0}'")]
    InvalidDriver(String),

    /// A stored record failed to decode. Fatal to the call that hit it,
    /// not to the process.
    #[error("codec error: {0}")]
    Codec(#[from] crate::codec::CodecError),

    /// An error surfaced verbatim from the underlying store.
    #[error("backend error: {0}")]
    Backend(String),

    /// The remote client's transport failed. The self-healing client
    /// recovers from this once per call before surfacing it.
    #[error("transport error: {0}")]
    Transport(String),

    /// A call was made on a façade after `close()` already succeeded once.
    #[error("façade is already closed")]
    AlreadyClosed,
}

impl Error {
    /// Stable string tag, useful for logging and for the wire protocol's
    /// error responses.
    pub fn reason_code(&self) -> &'static str {
        match self {
            Error::InvalidPairs(_) => "invalid_pairs",
            Error::InvalidDriver(_) => "invalid_driver",
            Error::Codec(_) => "codec",
            Error::Backend(_) => "backend",
            Error::Transport(_) => "transport",
            Error::AlreadyClosed => "already_closed",
        }
    }

    /// True for errors the self-healing client should reconnect and retry on.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }

    /// Wrap an arbitrary backend failure, e.g. from `sled`, `rusqlite`, or
    /// the `mongodb` driver.
    pub fn backend(err: impl std::fmt::Display) -> Self {
        Error::Backend(err.to_string())
    }
}

/// Convenience alias used throughout every façade-facing signature.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(Error::InvalidPairs(3).reason_code(), "invalid_pairs");
        assert_eq!(
            Error::InvalidDriver("oracle".into()).reason_code(),
            "invalid_driver"
        );
        assert_eq!(Error::Backend("disk full".into()).reason_code(), "backend");
        assert_eq!(
            Error::Transport("connection reset".into()).reason_code(),
            "transport"
        );
        assert_eq!(Error::AlreadyClosed.reason_code(), "already_closed");
    }

    #[test]
    fn only_transport_errors_trigger_reconnect() {
        assert!(Error::Transport("reset".into()).is_transport());
        assert!(!Error::AlreadyClosed.is_transport());
        assert!(!Error::Backend("x".into()).is_transport());
    }

    #[test]
    fn invalid_pairs_message_reports_the_length() {
        let err = Error::InvalidPairs(3);
        assert!(err.to_string().contains('3'));
    }
}

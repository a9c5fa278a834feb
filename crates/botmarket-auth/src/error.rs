//! Error types.

use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
///
/// Token validation is not in here on purpose: it reports through
/// [`TokenState`](crate::TokenState) instead.
#[derive(Debug, Error)]
pub enum Error {
    /// The signing secret is shorter than [`MIN_SECRET_LEN`](crate::MIN_SECRET_LEN) bytes.
    #[error("session secret too short: {0} bytes")]
    WeakSecret(usize),

    /// A route pattern could not be parsed.
    #[error("invalid route pattern {pattern:?}: {reason}")]
    Pattern {
        /// The offending pattern.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Cookie options are inconsistent.
    #[error("invalid cookie options: {0}")]
    Cookie(String),

    /// Password hashing failed.
    #[error("password hashing failed: {0}")]
    Password(String),

    /// jsonwebtoken error while signing.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

//! botmarket-auth
//!
//! Session authentication for the botmarket web service.
//! It covers the pieces every request handler leans on:
//!
//! - **Issuing and validating session tokens** (HS256, expiry checked against an injectable clock)
//! - **Gating protected routes** (glob-style path patterns, redirect to the login page)
//! - **Resolving the caller** from the session cookie into a [`Principal`](botmarket_api::Principal)
//! - **Building session cookies** (HttpOnly, SameSite, `__Host-` semantics)
//!
//! Token validation never fails loudly: malformed, forged and expired tokens all come back
//! as [`TokenState::Invalid`], so callers branch on exactly two outcomes.
//!
//! ## Quick start
//! ```no_run
//! use botmarket_api::Principal;
//! use botmarket_auth::{IdentityResolver, TokenCodec};
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let codec = TokenCodec::new(b"0123456789abcdef0123456789abcdef")?;
//! let token = codec.issue(&Principal {
//!     id: "u1".to_string(),
//!     email: Some("ada@example.com".to_string()),
//!     name: None,
//! })?;
//!
//! let resolver = IdentityResolver::new(codec, "botmarket_session");
//! let identity = resolver.resolve(Some(&token));
//! println!("authenticated={}", identity.principal().is_some());
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod cookie;
mod error;
mod gate;
mod identity;
mod password;
mod token;

pub use cookie::{CookieOptions, SameSite, build_clear_cookie, build_set_cookie, read_cookie};
pub use error::{Error, Result};
pub use gate::{GateDecision, RouteMatcher, SessionGate};
pub use identity::{Identity, IdentityResolver, assert_owner};
pub use password::{hash_password, verify_missing, verify_password};
pub use token::{
    Clock, DEFAULT_TOKEN_TTL, MIN_SECRET_LEN, ManualClock, SessionClaims, SystemClock,
    TokenCodec, TokenState, canonical_id, random_state,
};

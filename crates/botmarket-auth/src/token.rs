//! Session token issuing and validation.

use crate::Result;
use crate::error::Error;

use base64::Engine;
use botmarket_api::Principal;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Lifetime of a token issued without an explicit TTL.
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Shortest accepted HMAC secret, in bytes.
pub const MIN_SECRET_LEN: usize = 32;

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Seconds since the Unix epoch.
    fn now_secs(&self) -> u64;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_secs(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::from_secs(0))
            .as_secs()
    }
}

/// Clock that only moves when told to. Used to exercise expiry.
#[derive(Debug, Default)]
pub struct ManualClock {
    secs: AtomicU64,
}

impl ManualClock {
    /// Start at `secs` since the epoch.
    pub fn new(secs: u64) -> Self {
        Self {
            secs: AtomicU64::new(secs),
        }
    }

    /// Move forward by `by`.
    pub fn advance(&self, by: Duration) {
        self.secs.fetch_add(by.as_secs(), Ordering::SeqCst);
    }

    /// Jump to an absolute time.
    pub fn set(&self, secs: u64) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_secs(&self) -> u64 {
        self.secs.load(Ordering::SeqCst)
    }
}

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id, always in canonical string form.
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,

    /// User email.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Issued-at (Unix seconds).
    #[serde(default)]
    pub iat: u64,

    /// Expiry (Unix seconds).
    pub exp: u64,
}

impl SessionClaims {
    /// The identity these claims describe.
    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
        }
    }
}

/// Outcome of [`TokenCodec::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenState {
    /// Signature checks out and the token has not expired.
    Valid(SessionClaims),
    /// Anything else.
    Invalid,
}

impl TokenState {
    /// Claims when valid.
    pub fn claims(&self) -> Option<&SessionClaims> {
        match self {
            TokenState::Valid(c) => Some(c),
            TokenState::Invalid => None,
        }
    }

    /// True for [`TokenState::Valid`].
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenState::Valid(_))
    }
}

/// Signs and verifies session tokens with one process-wide HMAC secret.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec")
            .field("ttl", &self.ttl)
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

impl TokenCodec {
    /// Build a codec from the raw secret. Rejects secrets shorter than [`MIN_SECRET_LEN`].
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.len() < MIN_SECRET_LEN {
            return Err(Error::WeakSecret(secret.len()));
        }
        Ok(Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: DEFAULT_TOKEN_TTL,
            clock: Arc::new(SystemClock),
        })
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the default TTL used by [`TokenCodec::issue`].
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Default TTL.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a token for `subject` with the default TTL.
    pub fn issue(&self, subject: &Principal) -> Result<String> {
        self.issue_with_ttl(subject, self.ttl)
    }

    /// Issue a token for `subject` that expires `ttl` from now.
    pub fn issue_with_ttl(&self, subject: &Principal, ttl: Duration) -> Result<String> {
        let now = self.clock.now_secs();
        let claims = SessionClaims {
            id: subject.id.clone(),
            email: subject.email.clone(),
            name: subject.name.clone(),
            iat: now,
            exp: now.saturating_add(ttl.as_secs()),
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.encoding,
        )?)
    }

    /// Check signature and expiry. Every failure maps to [`TokenState::Invalid`].
    pub fn validate(&self, token: &str) -> TokenState {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is checked against `self.clock` below, not the wall clock.
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp"]);

        match jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation) {
            Ok(data) => {
                if data.claims.exp <= self.clock.now_secs() {
                    tracing::debug!(exp = data.claims.exp, "session token expired");
                    TokenState::Invalid
                } else {
                    TokenState::Valid(data.claims)
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "session token rejected");
                TokenState::Invalid
            }
        }
    }
}

/// Normalize a stored or decoded id into its canonical string form.
///
/// Accepts non-empty strings, integers and `{"$oid": "..."}` objects.
pub fn canonical_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map
            .get("$oid")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => None,
    }
}

fn deserialize_id<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    let raw = Value::deserialize(d)?;
    canonical_id(&raw).ok_or_else(|| de::Error::custom("unsupported id claim"))
}

/// Random URL-safe string for OAuth `state` round trips.
pub fn random_state() -> String {
    let mut bytes = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

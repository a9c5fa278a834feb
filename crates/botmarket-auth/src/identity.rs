//! Caller identity and the ownership rule.

use crate::cookie::read_cookie;
use crate::token::{TokenCodec, TokenState};
use botmarket_api::{BotmarketError, Principal};

/// Who is making the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Identity {
    /// A valid session token was presented.
    Authenticated(Principal),
    /// No cookie, an empty cookie, or a token that failed validation.
    Anonymous,
}

impl Identity {
    /// The principal, if authenticated.
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Identity::Authenticated(p) => Some(p),
            Identity::Anonymous => None,
        }
    }

    /// Turn `Anonymous` into an authentication error.
    pub fn require(self) -> Result<Principal, BotmarketError> {
        match self {
            Identity::Authenticated(p) => Ok(p),
            Identity::Anonymous => Err(BotmarketError::Auth(
                "authentication required".to_string(),
            )),
        }
    }
}

/// Resolves session cookies into [`Identity`] values.
#[derive(Debug, Clone)]
pub struct IdentityResolver {
    codec: TokenCodec,
    cookie_name: String,
}

impl IdentityResolver {
    /// `cookie_name` is the effective name, prefix included.
    pub fn new(codec: TokenCodec, cookie_name: impl Into<String>) -> Self {
        Self {
            codec,
            cookie_name: cookie_name.into(),
        }
    }

    /// Codec used for validation.
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Cookie the token is read from.
    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    /// Resolve the raw session cookie value.
    pub fn resolve(&self, cookie_value: Option<&str>) -> Identity {
        let Some(token) = cookie_value.filter(|v| !v.is_empty()) else {
            return Identity::Anonymous;
        };
        match self.codec.validate(token) {
            TokenState::Valid(claims) => Identity::Authenticated(claims.principal()),
            TokenState::Invalid => Identity::Anonymous,
        }
    }

    /// Resolve from a whole `Cookie` request header.
    pub fn resolve_header(&self, cookie_header: Option<&str>) -> Identity {
        self.resolve(cookie_header.and_then(|h| read_cookie(h, &self.cookie_name)))
    }
}

/// Fail unless `principal` owns the record whose stored owner is `owner_id`.
pub fn assert_owner(principal: &Principal, owner_id: &str) -> Result<(), BotmarketError> {
    if principal.id == owner_id {
        Ok(())
    } else {
        Err(BotmarketError::Forbidden(
            "you do not own this resource".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::ManualClock;
    use std::sync::Arc;
    use std::time::Duration;

    fn resolver(clock: Arc<ManualClock>) -> IdentityResolver {
        let codec = TokenCodec::new(b"identity-secret-identity-secret-0000")
            .unwrap()
            .with_clock(clock);
        IdentityResolver::new(codec, "botmarket_session")
    }

    fn ada() -> Principal {
        Principal {
            id: "u1".to_string(),
            email: Some("ada@example.com".to_string()),
            name: Some("Ada".to_string()),
        }
    }

    #[test]
    fn missing_or_empty_cookie_is_anonymous() {
        let r = resolver(Arc::new(ManualClock::new(100)));
        assert_eq!(r.resolve(None), Identity::Anonymous);
        assert_eq!(r.resolve(Some("")), Identity::Anonymous);
        assert_eq!(r.resolve_header(None), Identity::Anonymous);
        assert_eq!(r.resolve_header(Some("theme=dark")), Identity::Anonymous);
    }

    #[test]
    fn valid_cookie_resolves_principal() {
        let r = resolver(Arc::new(ManualClock::new(100)));
        let token = r.codec().issue(&ada()).unwrap();
        let header = format!("a=b; botmarket_session={token}");
        assert_eq!(r.resolve_header(Some(&header)), Identity::Authenticated(ada()));
    }

    #[test]
    fn expired_cookie_is_anonymous() {
        let clock = Arc::new(ManualClock::new(100));
        let r = resolver(clock.clone());
        let token = r.codec().issue(&ada()).unwrap();
        clock.advance(Duration::from_secs(2 * 24 * 60 * 60));
        assert_eq!(r.resolve(Some(&token)), Identity::Anonymous);
        assert!(r.resolve(Some(&token)).require().is_err());
    }

    #[test]
    fn ownership() {
        let p = ada();
        assert!(assert_owner(&p, "u1").is_ok());
        let err = assert_owner(&p, "u2").unwrap_err();
        assert_eq!(err.status_code(), 403);
    }
}

use std::sync::Arc;

use botmarket_api::{Account, BotmarketError, Principal, ProviderProfile, PublicUser, User};
use botmarket_auth::{hash_password, random_state, verify_missing, verify_password};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::{AppRuntime, max_len, new_id, now_secs, required};

const USERS: &str = "users";
/// Uniqueness index: `local:{email}` or `{provider}:{email}` -> user id.
const IDENTITIES: &str = "identities";
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfilePatch {
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// A freshly signed session plus the account it belongs to.
#[derive(Debug, Clone, Serialize)]
pub struct SessionGrant {
    #[serde(skip)]
    pub token: String,
    pub principal: Principal,
    pub account: Account,
}

/// Where to send the browser to start an OAuth login.
#[derive(Debug, Clone)]
pub struct OAuthStart {
    pub url: String,
    pub state: String,
}

fn normalize_email(raw: &str) -> Result<String, BotmarketError> {
    let email = required("email", raw)?.to_lowercase();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(email),
        _ => Err(BotmarketError::Validation(format!("invalid email: {email}"))),
    }
}

fn identity_key(provider: Option<&str>, email: &str) -> String {
    format!("{}:{email}", provider.unwrap_or("local"))
}

fn decode_user(doc: serde_json::Value) -> Result<User, BotmarketError> {
    serde_json::from_value(doc).map_err(|e| BotmarketError::Internal(format!("corrupt user document: {e}")))
}

fn encode_user(user: &User) -> Result<serde_json::Value, BotmarketError> {
    serde_json::to_value(user).map_err(|e| BotmarketError::Internal(format!("encode user: {e}")))
}

impl AppRuntime {
    pub fn register(&self, input: RegisterInput) -> Result<SessionGrant, BotmarketError> {
        let email = normalize_email(&input.email)?;
        let name = required("name", &input.name)?;
        max_len("name", &name, 100)?;
        if input.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(BotmarketError::Validation(format!(
                "password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }
        let password_hash =
            hash_password(&input.password).map_err(|e| BotmarketError::Internal(e.to_string()))?;

        let user = User {
            id: new_id(),
            email,
            name,
            password_hash: Some(password_hash),
            provider: None,
            provider_token: None,
            avatar: None,
            created_at: now_secs(),
        };
        self.claim_identity(&user).map_err(|e| match e {
            BotmarketError::Conflict(_) => {
                BotmarketError::Conflict("email is already registered".to_string())
            }
            other => other,
        })?;

        tracing::info!(user_id = %user.id, "local account registered");
        self.grant(&user)
    }

    pub fn login(&self, input: LoginInput) -> Result<SessionGrant, BotmarketError> {
        let rejected = || BotmarketError::Auth("invalid email or password".to_string());

        let user = match normalize_email(&input.email) {
            Ok(email) => self.user_by_identity(&identity_key(None, &email))?,
            Err(_) => None,
        };
        let Some(user) = user else {
            verify_missing(&input.password);
            tracing::warn!("login for unknown account");
            return Err(rejected());
        };
        let verified = match user.password_hash.as_deref() {
            Some(hash) => verify_password(hash, &input.password),
            None => verify_missing(&input.password),
        };
        if !verified {
            tracing::warn!(user_id = %user.id, "login with wrong password");
            return Err(rejected());
        }
        self.grant(&user)
    }

    pub fn authorize_redirect(&self, provider: &str) -> Result<OAuthStart, BotmarketError> {
        let oauth = self.provider(provider)?;
        let state = random_state();
        let url = oauth.authorize_url(&state, &self.config.oauth.redirect_uri(provider))?;
        Ok(OAuthStart { url, state })
    }

    /// Finish an OAuth round trip: check `state`, trade `code` for a provider
    /// token, then find or create the account and sign a session for it.
    pub async fn complete_oauth(
        &self,
        provider: &str,
        code: &str,
        state: &str,
        expected_state: Option<&str>,
    ) -> Result<SessionGrant, BotmarketError> {
        if state.is_empty() || expected_state != Some(state) {
            tracing::warn!(provider, "oauth state mismatch");
            return Err(BotmarketError::Validation("oauth state mismatch".to_string()));
        }
        let code = required("code", code)?;
        let oauth = Arc::clone(self.provider(provider)?);
        let redirect_uri = self.config.oauth.redirect_uri(provider);

        let token = oauth.exchange_code(&code, &redirect_uri).await.inspect_err(|e| {
            tracing::warn!(provider, error = %e, "oauth code exchange failed");
        })?;
        let profile = oauth.fetch_profile(&token).await.inspect_err(|e| {
            tracing::warn!(provider, error = %e, "oauth profile fetch failed");
        })?;

        let user = self.upsert_oauth_user(provider, &profile, token)?;
        self.grant(&user)
    }

    pub fn get_user(&self, id: &str) -> Result<PublicUser, BotmarketError> {
        Ok(self.load_user(id)?.public())
    }

    pub fn me(&self, principal: &Principal) -> Result<Account, BotmarketError> {
        Ok(self.load_user(&principal.id)?.account())
    }

    pub fn update_profile(
        &self,
        principal: &Principal,
        patch: ProfilePatch,
    ) -> Result<Account, BotmarketError> {
        let name = patch.name.as_deref().map(|n| required("name", n)).transpose()?;
        if let Some(n) = &name {
            max_len("name", n, 100)?;
        }
        let avatar = patch.avatar.map(|a| a.trim().to_string());

        let user = self.update_user(&principal.id, |user| {
            if let Some(n) = &name {
                user.name.clone_from(n);
            }
            if let Some(a) = &avatar {
                user.avatar = (!a.is_empty()).then(|| a.clone());
            }
        })?;
        Ok(user.account())
    }

    fn grant(&self, user: &User) -> Result<SessionGrant, BotmarketError> {
        let principal = user.principal();
        let token = self
            .codec()
            .issue(&principal)
            .map_err(|e| BotmarketError::Internal(format!("sign session token: {e}")))?;
        Ok(SessionGrant {
            token,
            principal,
            account: user.account(),
        })
    }

    fn load_user(&self, id: &str) -> Result<User, BotmarketError> {
        self.store
            .get(USERS, id)?
            .map(decode_user)
            .transpose()?
            .ok_or_else(|| BotmarketError::NotFound(format!("user {id} not found")))
    }

    fn user_by_identity(&self, key: &str) -> Result<Option<User>, BotmarketError> {
        let Some(link) = self.store.get(IDENTITIES, key)? else {
            return Ok(None);
        };
        let user_id = link
            .get("user_id")
            .and_then(serde_json::Value::as_str)
            .ok_or_else(|| BotmarketError::Internal(format!("identity {key} has no user")))?;
        self.load_user(user_id).map(Some)
    }

    fn update_user(&self, id: &str, mut apply: impl FnMut(&mut User)) -> Result<User, BotmarketError> {
        let updated = self.store.update(USERS, id, &mut |doc| {
            let mut user = decode_user(doc.clone())?;
            apply(&mut user);
            *doc = encode_user(&user)?;
            Ok(())
        })?;
        updated
            .map(decode_user)
            .transpose()?
            .ok_or_else(|| BotmarketError::NotFound(format!("user {id} not found")))
    }

    /// Store `user` and bind its identity key. The identity insert is the
    /// uniqueness check; on conflict the new user document is withdrawn.
    fn claim_identity(&self, user: &User) -> Result<(), BotmarketError> {
        let key = identity_key(user.provider.as_deref(), &user.email);
        self.store.insert(USERS, &user.id, encode_user(user)?)?;
        if let Err(e) = self.store.insert(IDENTITIES, &key, json!({ "user_id": user.id })) {
            self.store.delete(USERS, &user.id)?;
            return Err(e);
        }
        Ok(())
    }

    fn upsert_oauth_user(
        &self,
        provider: &str,
        profile: &ProviderProfile,
        provider_token: String,
    ) -> Result<User, BotmarketError> {
        let email = match (&profile.email, profile.email_verified) {
            (Some(email), true) => normalize_email(email)?,
            _ => {
                tracing::warn!(provider, "oauth profile without a verified email");
                return Err(BotmarketError::Validation(format!(
                    "{provider} account has no verified email"
                )));
            }
        };
        let name = profile
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string());
        let key = identity_key(Some(provider), &email);

        let refresh = |runtime: &Self, existing: User| {
            runtime.update_user(&existing.id, |user| {
                user.provider_token = Some(provider_token.clone());
                user.name.clone_from(&name);
                if profile.avatar.is_some() {
                    user.avatar.clone_from(&profile.avatar);
                }
            })
        };

        if let Some(existing) = self.user_by_identity(&key)? {
            return refresh(self, existing);
        }

        let user = User {
            id: new_id(),
            email,
            name: name.clone(),
            password_hash: None,
            provider: Some(provider.to_string()),
            provider_token: Some(provider_token.clone()),
            avatar: profile.avatar.clone(),
            created_at: now_secs(),
        };
        match self.claim_identity(&user) {
            Ok(()) => {
                tracing::info!(user_id = %user.id, provider, "oauth account created");
                Ok(user)
            }
            // Lost a race with a concurrent first login for the same account.
            Err(BotmarketError::Conflict(_)) => match self.user_by_identity(&key)? {
                Some(existing) => refresh(self, existing),
                None => Err(BotmarketError::Internal(format!("identity {key} vanished"))),
            },
            Err(e) => Err(e),
        }
    }
}

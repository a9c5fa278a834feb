mod accounts;
mod bots;
mod chatlogs;
mod comments;
mod credentials;
mod projects;
mod repo;
mod saas;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use botmarket_api::{BotmarketError, DocumentStore, OAuthProvider, Principal, SecretStore};
use botmarket_auth::{IdentityResolver, RouteMatcher, SessionGate, TokenCodec};
use botmarket_connectors::{EnvSecretStore, ProviderMap, SqliteStore, build_providers};
use botmarket_core::{AppConfig, validate_config};
use serde::Serialize;

pub use accounts::{LoginInput, OAuthStart, ProfilePatch, RegisterInput, SessionGrant};
pub use bots::{BotPatch, NewBot};
pub use chatlogs::{NewChatlog, NewMessage};
pub use comments::CommentInput;
pub use credentials::{CredentialPatch, NewCredential};
pub use projects::{NewProject, ProjectPatch};
pub use saas::{NewSaas, SaasPatch, SaasView};

pub struct AppRuntime {
    config: AppConfig,
    store: Arc<dyn DocumentStore>,
    resolver: IdentityResolver,
    providers: ProviderMap,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub bots: usize,
    pub credentials: usize,
    pub chatlogs: usize,
    pub projects: usize,
}

impl AppRuntime {
    /// Production wiring: env secrets, the SQLite store at `store.path`,
    /// configured OAuth providers.
    pub fn from_config(config: AppConfig) -> Result<Self, BotmarketError> {
        validate_config(&config)?;

        let secrets = EnvSecretStore;
        let codec = codec_from_secrets(&config, &secrets)?;
        let providers = build_providers(&config.oauth, &secrets)?;
        let store = SqliteStore::open(&config.store.resolved_path())?;
        Self::from_parts(config, Arc::new(store), codec, providers)
    }

    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn DocumentStore>,
        codec: TokenCodec,
        providers: ProviderMap,
    ) -> Result<Self, BotmarketError> {
        validate_config(&config)?;

        let cookie_name = config
            .session
            .cookie_options()
            .effective_name()
            .map_err(|e| BotmarketError::Validation(e.to_string()))?;
        let resolver = IdentityResolver::new(codec, cookie_name);

        Ok(Self {
            config,
            store,
            resolver,
            providers,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn resolver(&self) -> &IdentityResolver {
        &self.resolver
    }

    pub fn codec(&self) -> &TokenCodec {
        self.resolver.codec()
    }

    pub fn provider(&self, id: &str) -> Result<&Arc<dyn OAuthProvider>, BotmarketError> {
        self.providers
            .get(id)
            .ok_or_else(|| BotmarketError::NotFound(format!("oauth provider {id} is not configured")))
    }

    pub fn provider_ids(&self) -> impl Iterator<Item = &str> {
        self.providers.keys().map(String::as_str)
    }

    pub fn session_gate(&self) -> Result<SessionGate, BotmarketError> {
        let matcher = RouteMatcher::new(self.config.session.protected.as_slice())
            .map_err(|e| BotmarketError::Validation(e.to_string()))?;
        Ok(SessionGate::new(
            matcher,
            self.resolver.clone(),
            self.config.session.login_path.clone(),
        ))
    }

    pub fn dashboard_summary(&self, principal: &Principal) -> Result<DashboardSummary, BotmarketError> {
        Ok(DashboardSummary {
            bots: self.list_bots(principal)?.len(),
            credentials: self.list_credentials(principal)?.len(),
            chatlogs: self.list_chatlogs(principal, None)?.len(),
            projects: self.list_projects(Some(principal.id.as_str()))?.len(),
        })
    }
}

/// Read the signing secret once. A missing secret is fatal; there is no fallback.
pub fn codec_from_secrets(
    config: &AppConfig,
    secrets: &dyn SecretStore,
) -> Result<TokenCodec, BotmarketError> {
    let secret_ref = &config.session.secret_ref;
    let secret = secrets.get(secret_ref).map_err(|_| {
        BotmarketError::Validation(format!(
            "session secret {secret_ref} is not set; refusing to start"
        ))
    })?;
    let codec = TokenCodec::new(secret.as_bytes())
        .map_err(|e| BotmarketError::Validation(format!("{secret_ref}: {e}")))?;
    Ok(codec.with_ttl(config.session.token_ttl()))
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Trim `value` and reject it when empty.
fn required(field: &str, value: &str) -> Result<String, BotmarketError> {
    let v = value.trim();
    if v.is_empty() {
        return Err(BotmarketError::Validation(format!("{field} is required")));
    }
    Ok(v.to_string())
}

fn max_len(field: &str, value: &str, max: usize) -> Result<(), BotmarketError> {
    if value.chars().count() > max {
        return Err(BotmarketError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(())
}

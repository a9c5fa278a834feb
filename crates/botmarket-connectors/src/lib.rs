mod oauth;
mod sqlite;
mod store;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use botmarket_api::{BotmarketError, OAuthProvider, SecretStore};
use botmarket_core::OAuthConfig;

pub use oauth::{GithubProvider, GoogleProvider, pick_github_email};
pub use sqlite::SqliteStore;
pub use store::MemoryStore;

pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, secret_ref: &str) -> Result<String, BotmarketError> {
        std::env::var(secret_ref)
            .ok()
            .filter(|v| !v.is_empty())
            .ok_or_else(|| BotmarketError::NotFound(format!("missing secret env var {secret_ref}")))
    }
}

pub type ProviderMap = BTreeMap<String, Arc<dyn OAuthProvider>>;

/// Build every provider enabled in `cfg`, resolving client secrets through `secrets`.
pub fn build_providers(
    cfg: &OAuthConfig,
    secrets: &dyn SecretStore,
) -> Result<ProviderMap, BotmarketError> {
    let timeout = Duration::from_secs(cfg.http_timeout_secs);
    let mut providers: ProviderMap = BTreeMap::new();

    if let Some(gh) = &cfg.github {
        let secret = secrets.get(&gh.client_secret_ref)?;
        providers.insert(
            "github".to_string(),
            Arc::new(GithubProvider::new(gh, secret, timeout)?),
        );
    }
    if let Some(google) = &cfg.google {
        let secret = secrets.get(&google.client_secret_ref)?;
        providers.insert(
            "google".to_string(),
            Arc::new(GoogleProvider::new(google, secret, timeout)?),
        );
    }

    tracing::debug!(count = providers.len(), "oauth providers configured");
    Ok(providers)
}

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use botmarket_api::BotmarketError;
use botmarket_auth::{CookieOptions, RouteMatcher, SameSite};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "botmarket.toml";
pub const STORE_FILE: &str = "botmarket.db";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub oauth: OAuthConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub request_timeout_secs: u64,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// SQLite database file; `None` means [`default_store_path`].
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(default_store_path)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub secret_ref: String,
    pub token_ttl_secs: u64,
    pub cookie_name: String,
    pub cookie_max_age_secs: u64,
    pub cookie_secure: bool,
    pub cookie_host_prefix: bool,
    pub login_path: String,
    pub dashboard_path: String,
    pub protected: Vec<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_ref: "BOTMARKET_SESSION_SECRET".to_string(),
            token_ttl_secs: 24 * 60 * 60,
            cookie_name: "botmarket_session".to_string(),
            cookie_max_age_secs: 7 * 24 * 60 * 60,
            cookie_secure: false,
            cookie_host_prefix: false,
            login_path: "/login".to_string(),
            dashboard_path: "/dashboard".to_string(),
            protected: vec!["/dashboard/**".to_string()],
        }
    }
}

impl SessionConfig {
    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }

    pub fn cookie_options(&self) -> CookieOptions {
        CookieOptions {
            name: self.cookie_name.clone(),
            path: "/".to_string(),
            domain: None,
            secure: self.cookie_secure,
            http_only: true,
            same_site: SameSite::Lax,
            max_age_seconds: Some(self.cookie_max_age_secs),
            use_host_prefix: self.cookie_host_prefix,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OAuthConfig {
    pub public_url: String,
    pub http_timeout_secs: u64,
    pub github: Option<ProviderConfig>,
    pub google: Option<ProviderConfig>,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            public_url: "http://127.0.0.1:8080".to_string(),
            http_timeout_secs: 10,
            github: None,
            google: None,
        }
    }
}

impl OAuthConfig {
    /// Where `provider` sends the browser back after consent.
    pub fn redirect_uri(&self, provider: &str) -> String {
        format!(
            "{}/api/auth/oauth/{provider}/callback",
            self.public_url.trim_end_matches('/')
        )
    }

    pub fn providers(&self) -> impl Iterator<Item = (&'static str, &ProviderConfig)> {
        [("github", self.github.as_ref()), ("google", self.google.as_ref())]
            .into_iter()
            .filter_map(|(id, cfg)| cfg.map(|c| (id, c)))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret_ref: String,
    #[serde(default)]
    pub authorize_url: Option<String>,
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default)]
    pub api_url: Option<String>,
}

pub fn validate_config(cfg: &AppConfig) -> Result<(), BotmarketError> {
    let session = &cfg.session;
    if session.secret_ref.trim().is_empty() {
        return Err(BotmarketError::Validation(
            "session.secret_ref must not be empty".to_string(),
        ));
    }
    if session.token_ttl_secs == 0 || session.cookie_max_age_secs == 0 {
        return Err(BotmarketError::Validation(
            "session TTLs must be greater than zero".to_string(),
        ));
    }
    if session.cookie_name.trim().is_empty() {
        return Err(BotmarketError::Validation(
            "session.cookie_name must not be empty".to_string(),
        ));
    }
    if session.protected.iter().any(|p| p.trim().is_empty()) {
        return Err(BotmarketError::Validation(
            "session.protected contains an empty pattern".to_string(),
        ));
    }

    let matcher = RouteMatcher::new(session.protected.as_slice())
        .map_err(|e| BotmarketError::Validation(e.to_string()))?;
    if matcher.matches(&session.login_path) {
        return Err(BotmarketError::Validation(format!(
            "login path {} is itself protected",
            session.login_path
        )));
    }
    session
        .cookie_options()
        .effective_name()
        .map_err(|e| BotmarketError::Validation(e.to_string()))?;

    if cfg.server.request_timeout_secs == 0 || cfg.oauth.http_timeout_secs == 0 {
        return Err(BotmarketError::Validation(
            "timeouts must be greater than zero".to_string(),
        ));
    }

    if cfg
        .store
        .path
        .as_ref()
        .is_some_and(|p| p.as_os_str().is_empty())
    {
        return Err(BotmarketError::Validation(
            "store.path must not be empty".to_string(),
        ));
    }

    for (id, provider) in cfg.oauth.providers() {
        if provider.client_id.trim().is_empty() {
            return Err(BotmarketError::Validation(format!(
                "oauth.{id}.client_id must not be empty"
            )));
        }
        if provider.client_secret_ref.trim().is_empty() {
            return Err(BotmarketError::Validation(format!(
                "oauth.{id}.client_secret_ref must not be empty"
            )));
        }
    }
    Ok(())
}

pub fn default_config_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("botmarket")
}

pub fn default_store_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("botmarket")
        .join(STORE_FILE)
}

/// Load `<dir>/botmarket.toml`, falling back to defaults when it does not exist.
pub fn load_config_from_dir(dir: &Path) -> Result<AppConfig, BotmarketError> {
    let path = dir.join(CONFIG_FILE);
    if !path.exists() {
        let cfg = apply_env_overrides(AppConfig::default());
        validate_config(&cfg)?;
        return Ok(cfg);
    }
    load_config_from_file(&path)
}

pub fn load_config_from_file(path: &Path) -> Result<AppConfig, BotmarketError> {
    let content = fs::read_to_string(path)
        .map_err(|e| BotmarketError::NotFound(format!("failed to read {}: {e}", path.display())))?;
    let parsed: AppConfig = toml::from_str(&content).map_err(|e| {
        BotmarketError::Validation(format!("invalid TOML in {}: {e}", path.display()))
    })?;

    let cfg = apply_env_overrides(parsed);
    validate_config(&cfg)?;
    Ok(cfg)
}

/// `BOTMARKET_BIND`, `BOTMARKET_PUBLIC_URL` and `BOTMARKET_STORE_PATH` win over the file.
pub fn apply_env_overrides(mut cfg: AppConfig) -> AppConfig {
    if let Ok(bind) = std::env::var("BOTMARKET_BIND") {
        if !bind.trim().is_empty() {
            cfg.server.bind = bind;
        }
    }
    if let Ok(url) = std::env::var("BOTMARKET_PUBLIC_URL") {
        if !url.trim().is_empty() {
            cfg.oauth.public_url = url;
        }
    }
    if let Ok(path) = std::env::var("BOTMARKET_STORE_PATH") {
        if !path.trim().is_empty() {
            cfg.store.path = Some(PathBuf::from(path));
        }
    }
    cfg
}

/// Write the commented default config. Existing files are kept unless `force`.
pub fn write_default_config_file(dir: &Path, force: bool) -> Result<PathBuf, BotmarketError> {
    fs::create_dir_all(dir).map_err(|e| {
        BotmarketError::Internal(format!("failed to create {}: {e}", dir.display()))
    })?;

    let path = dir.join(CONFIG_FILE);
    if force || !path.exists() {
        fs::write(
            &path,
            include_str!("../../../docs/botmarket/botmarket.toml.example"),
        )
        .map_err(|e| BotmarketError::Internal(format!("failed to write {}: {e}", path.display())))?;
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = AppConfig::default();
        validate_config(&cfg).unwrap();
        assert_eq!(cfg.session.protected, vec!["/dashboard/**".to_string()]);
        assert_eq!(cfg.session.cookie_max_age_secs, 604_800);
        assert_eq!(cfg.session.token_ttl().as_secs(), 86_400);
    }

    #[test]
    fn example_file_parses_to_defaults() {
        let cfg: AppConfig =
            toml::from_str(include_str!("../../../docs/botmarket/botmarket.toml.example")).unwrap();
        validate_config(&cfg).unwrap();
        assert_eq!(cfg.server.bind, ServerConfig::default().bind);
        assert!(cfg.oauth.github.is_none());
        assert!(cfg.store.path.is_none());
    }

    #[test]
    fn store_path_from_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[store]\npath = \"/var/lib/botmarket/data.db\"\n",
        )
        .unwrap();
        let cfg = load_config_from_dir(dir.path()).unwrap();
        assert_eq!(cfg.store.resolved_path(), PathBuf::from("/var/lib/botmarket/data.db"));
        assert!(AppConfig::default().store.resolved_path().ends_with(STORE_FILE));
    }

    #[test]
    fn empty_store_path_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.store.path = Some(PathBuf::new());
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn protected_login_path_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.session.protected = vec!["/**".to_string()];
        let err = validate_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("itself protected"));
    }

    #[test]
    fn bad_pattern_is_rejected() {
        let mut cfg = AppConfig::default();
        cfg.session.protected = vec!["dashboard".to_string()];
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn provider_needs_client_id() {
        let mut cfg = AppConfig::default();
        cfg.oauth.github = Some(ProviderConfig {
            client_id: String::new(),
            client_secret_ref: "X".to_string(),
            authorize_url: None,
            token_url: None,
            api_url: None,
        });
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[session]\nprotected = [\"/dashboard/**\", \"/settings\"]\n\n[oauth.github]\nclient_id = \"abc\"\nclient_secret_ref = \"GH_SECRET\"\n",
        )
        .unwrap();
        let cfg = load_config_from_dir(dir.path()).unwrap();
        assert_eq!(cfg.session.protected.len(), 2);
        assert_eq!(cfg.session.login_path, "/login");
        assert_eq!(cfg.oauth.providers().count(), 1);
        assert_eq!(
            cfg.oauth.redirect_uri("github"),
            format!("{}/api/auth/oauth/github/callback", cfg.oauth.public_url)
        );
    }

    #[test]
    fn init_does_not_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_default_config_file(dir.path(), false).unwrap();
        fs::write(&path, "# mine\n").unwrap();
        write_default_config_file(dir.path(), false).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "# mine\n");
        write_default_config_file(dir.path(), true).unwrap();
        assert!(fs::read_to_string(&path).unwrap().contains("[session]"));
    }

    #[test]
    fn missing_dir_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from_dir(&dir.path().join("nope")).unwrap();
        assert_eq!(cfg.session.cookie_name, "botmarket_session");
    }
}

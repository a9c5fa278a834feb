use std::time::Duration;

use async_trait::async_trait;
use botmarket_api::{BotmarketError, OAuthProvider, ProviderProfile};
use botmarket_core::ProviderConfig;
use reqwest::{Client, Url, header};
use serde::Deserialize;

const USER_AGENT: &str = concat!("botmarket/", env!("CARGO_PKG_VERSION"));

fn http_client(timeout: Duration) -> Result<Client, BotmarketError> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| BotmarketError::Internal(format!("failed to build HTTP client: {e}")))
}

fn upstream(provider: &str, e: &reqwest::Error) -> BotmarketError {
    if e.is_timeout() {
        BotmarketError::connection(provider, "request timed out")
    } else {
        BotmarketError::connection(provider, format!("request failed: {e}"))
    }
}

fn build_authorize_url(base: &str, params: &[(&str, &str)]) -> Result<String, BotmarketError> {
    Url::parse_with_params(base, params)
        .map(String::from)
        .map_err(|e| BotmarketError::Internal(format!("invalid authorize url {base}: {e}")))
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

impl TokenResponse {
    fn into_token(self, provider: &str) -> Result<String, BotmarketError> {
        match self.access_token.filter(|t| !t.is_empty()) {
            Some(token) => Ok(token),
            None => Err(BotmarketError::connection(provider, format!(
                "token exchange failed: {}",
                self.error_description
                    .or(self.error)
                    .unwrap_or_else(|| "no access token returned".to_string())
            ))),
        }
    }
}

// ─── GitHub ─────────────────────────────────────────────────────────────────

pub struct GithubProvider {
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    api_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: u64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

/// One entry of `GET /user/emails`.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubEmail {
    pub email: String,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub verified: bool,
}

/// Primary verified address first, then any verified one. Unverified addresses never qualify.
pub fn pick_github_email(emails: &[GithubEmail]) -> Option<String> {
    emails
        .iter()
        .find(|e| e.primary && e.verified)
        .or_else(|| emails.iter().find(|e| e.verified))
        .map(|e| e.email.clone())
}

impl GithubProvider {
    pub fn new(
        cfg: &ProviderConfig,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, BotmarketError> {
        Ok(Self {
            client_id: cfg.client_id.clone(),
            client_secret,
            authorize_url: cfg
                .authorize_url
                .clone()
                .unwrap_or_else(|| "https://github.com/login/oauth/authorize".to_string()),
            token_url: cfg
                .token_url
                .clone()
                .unwrap_or_else(|| "https://github.com/login/oauth/access_token".to_string()),
            api_url: cfg
                .api_url
                .clone()
                .unwrap_or_else(|| "https://api.github.com".to_string())
                .trim_end_matches('/')
                .to_string(),
            http: http_client(timeout)?,
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        access_token: &str,
    ) -> Result<T, BotmarketError> {
        let resp = self
            .http
            .get(format!("{}{path}", self.api_url))
            .bearer_auth(access_token)
            .header(header::ACCEPT, "application/vnd.github+json")
            .send()
            .await
            .map_err(|e| upstream("github", &e))?;
        if !resp.status().is_success() {
            return Err(BotmarketError::connection("github", format!(
                "{path} returned {}",
                resp.status()
            )));
        }
        resp.json().await.map_err(|e| upstream("github", &e))
    }
}

#[async_trait]
impl OAuthProvider for GithubProvider {
    fn id(&self) -> &str {
        "github"
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, BotmarketError> {
        build_authorize_url(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", "read:user user:email"),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, BotmarketError> {
        let resp = self
            .http
            .post(&self.token_url)
            .header(header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
            ])
            .send()
            .await
            .map_err(|e| upstream("github", &e))?;
        if !resp.status().is_success() {
            return Err(BotmarketError::connection("github", format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }
        let body: TokenResponse = resp.json().await.map_err(|e| upstream("github", &e))?;
        body.into_token("github")
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, BotmarketError> {
        let user: GithubUser = self.get_json("/user", access_token).await?;
        let emails: Vec<GithubEmail> = self.get_json("/user/emails", access_token).await?;
        let email = pick_github_email(&emails);

        Ok(ProviderProfile {
            provider_user_id: user.id.to_string(),
            email_verified: email.is_some(),
            email,
            name: user.name.filter(|n| !n.trim().is_empty()).or(Some(user.login)),
            avatar: user.avatar_url,
        })
    }
}

// ─── Google ─────────────────────────────────────────────────────────────────

pub struct GoogleProvider {
    client_id: String,
    client_secret: String,
    authorize_url: String,
    token_url: String,
    userinfo_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(
        cfg: &ProviderConfig,
        client_secret: String,
        timeout: Duration,
    ) -> Result<Self, BotmarketError> {
        Ok(Self {
            client_id: cfg.client_id.clone(),
            client_secret,
            authorize_url: cfg
                .authorize_url
                .clone()
                .unwrap_or_else(|| "https://accounts.google.com/o/oauth2/v2/auth".to_string()),
            token_url: cfg
                .token_url
                .clone()
                .unwrap_or_else(|| "https://oauth2.googleapis.com/token".to_string()),
            userinfo_url: cfg.api_url.clone().unwrap_or_else(|| {
                "https://openidconnect.googleapis.com/v1/userinfo".to_string()
            }),
            http: http_client(timeout)?,
        })
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, BotmarketError> {
        build_authorize_url(
            &self.authorize_url,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("response_type", "code"),
                ("scope", "openid email profile"),
                ("state", state),
            ],
        )
    }

    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, BotmarketError> {
        let resp = self
            .http
            .post(&self.token_url)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| upstream("google", &e))?;
        if !resp.status().is_success() {
            return Err(BotmarketError::connection("google", format!(
                "token endpoint returned {}",
                resp.status()
            )));
        }
        let body: TokenResponse = resp.json().await.map_err(|e| upstream("google", &e))?;
        body.into_token("google")
    }

    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, BotmarketError> {
        let resp = self
            .http
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| upstream("google", &e))?;
        if !resp.status().is_success() {
            return Err(BotmarketError::connection("google", format!(
                "userinfo returned {}",
                resp.status()
            )));
        }
        let info: GoogleUserInfo = resp.json().await.map_err(|e| upstream("google", &e))?;
        Ok(ProviderProfile {
            provider_user_id: info.sub,
            email_verified: info.email_verified && info.email.is_some(),
            email: info.email,
            name: info.name,
            avatar: info.picture,
        })
    }
}

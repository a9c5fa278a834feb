use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub type UserId = String;
pub type RecordId = String;

/// Identity of the caller, rebuilt from the session token on every request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: UserId,
    pub email: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub name: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub provider_token: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    pub created_at: u64,
}

impl User {
    pub fn is_local(&self) -> bool {
        self.provider.is_none()
    }

    pub fn principal(&self) -> Principal {
        Principal {
            id: self.id.clone(),
            email: Some(self.email.clone()),
            name: Some(self.name.clone()),
        }
    }

    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            provider: self.provider.clone(),
            created_at: self.created_at,
        }
    }

    pub fn account(&self) -> Account {
        Account {
            id: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            provider: self.provider.clone(),
            created_at: self.created_at,
        }
    }
}

/// What a signed-in user sees about themselves.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: UserId,
    pub email: String,
    pub name: String,
    pub avatar: Option<String>,
    pub provider: Option<String>,
    pub created_at: u64,
}

/// User fields safe to hand to any caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: UserId,
    pub name: String,
    pub avatar: Option<String>,
    pub provider: Option<String>,
    pub created_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: RecordId,
    pub owner_id: UserId,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommentTarget {
    Project,
    Saas,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: RecordId,
    pub owner_id: UserId,
    pub target_kind: CommentTarget,
    pub target_id: RecordId,
    pub body: String,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credential {
    pub id: RecordId,
    pub owner_id: UserId,
    pub label: String,
    pub provider: String,
    pub secret: String,
    pub created_at: u64,
    pub updated_at: u64,
}

impl Credential {
    /// Copy with the secret reduced to its last four characters.
    pub fn masked(&self) -> Self {
        let chars: Vec<char> = self.secret.chars().collect();
        let tail: String = if chars.len() > 4 {
            chars[chars.len() - 4..].iter().collect()
        } else {
            String::new()
        };
        Self {
            secret: format!("****{tail}"),
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bot {
    pub id: RecordId,
    pub owner_id: UserId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model: String,
    #[serde(default)]
    pub credential_id: Option<RecordId>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chatlog {
    pub id: RecordId,
    pub owner_id: UserId,
    pub bot_id: RecordId,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    pub created_at: u64,
    pub updated_at: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SaasEntry {
    pub id: RecordId,
    pub owner_id: UserId,
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    /// Voter id -> +1 or -1.
    #[serde(default)]
    pub votes: BTreeMap<UserId, i8>,
    pub created_at: u64,
    pub updated_at: u64,
}

impl SaasEntry {
    pub fn score(&self) -> i64 {
        self.votes.values().map(|v| i64::from(*v)).sum()
    }
}

/// Profile returned by an external identity provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProviderProfile {
    pub provider_user_id: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub name: Option<String>,
    pub avatar: Option<String>,
}

/// Equality filter over top-level document fields.
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub fields: BTreeMap<String, Value>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn eq(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(field.to_string(), value.into());
        self
    }

    pub fn matches(&self, doc: &Value) -> bool {
        self.fields
            .iter()
            .all(|(k, v)| doc.get(k).unwrap_or(&Value::Null) == v)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BotmarketError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("authentication error: {0}")]
    Auth(String),
    #[error("forbidden: {0}")]
    Forbidden(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict error: {0}")]
    Conflict(String),
    #[error("connection error: {provider}: {detail}")]
    Connection { provider: String, detail: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl BotmarketError {
    pub fn connection(provider: &str, detail: impl Into<String>) -> Self {
        Self::Connection {
            provider: provider.to_string(),
            detail: detail.into(),
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) => 400,
            Self::Auth(_) => 401,
            Self::Forbidden(_) => 403,
            Self::NotFound(_) => 404,
            Self::Conflict(_) => 409,
            Self::Connection { .. } => 502,
            Self::Internal(_) => 500,
        }
    }

    /// Message safe to send to a client. Internal details stay server-side.
    pub fn public_message(&self) -> String {
        match self {
            Self::Internal(_) => "internal error".to_string(),
            Self::Connection { provider, .. } => format!("{provider} is unavailable"),
            Self::Validation(m)
            | Self::Auth(m)
            | Self::Forbidden(m)
            | Self::NotFound(m)
            | Self::Conflict(m) => m.clone(),
        }
    }
}

pub trait SecretStore: Send + Sync {
    fn get(&self, secret_ref: &str) -> Result<String, BotmarketError>;
}

/// Schemaless record persistence. Every call is atomic for the single
/// document it touches; nothing spans documents.
pub trait DocumentStore: Send + Sync {
    /// Fails with `Conflict` if `id` already exists in `collection`.
    fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<(), BotmarketError>;
    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, BotmarketError>;
    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, BotmarketError>;
    /// Read-modify-write of one document under its lock. Returns the new
    /// document, or `None` when it does not exist.
    fn update(
        &self,
        collection: &str,
        id: &str,
        apply: &mut dyn FnMut(&mut Value) -> Result<(), BotmarketError>,
    ) -> Result<Option<Value>, BotmarketError>;
    fn delete(&self, collection: &str, id: &str) -> Result<bool, BotmarketError>;
}

#[async_trait::async_trait]
pub trait OAuthProvider: Send + Sync {
    fn id(&self) -> &str;
    fn authorize_url(&self, state: &str, redirect_uri: &str) -> Result<String, BotmarketError>;
    async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<String, BotmarketError>;
    async fn fetch_profile(&self, access_token: &str) -> Result<ProviderProfile, BotmarketError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_credential_keeps_tail() {
        let c = Credential {
            id: "c1".to_string(),
            owner_id: "u1".to_string(),
            label: "openai".to_string(),
            provider: "openai".to_string(),
            secret: "sk-abcdef123456".to_string(),
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(c.masked().secret, "****3456");

        let short = Credential {
            secret: "ab".to_string(),
            ..c
        };
        assert_eq!(short.masked().secret, "****");

        let four = Credential {
            secret: "abcd".to_string(),
            ..short.clone()
        };
        assert_eq!(four.masked().secret, "****");
        let five = Credential {
            secret: "abcde".to_string(),
            ..short
        };
        assert_eq!(five.masked().secret, "****bcde");
    }

    #[test]
    fn filter_matches_top_level_fields() {
        let doc = serde_json::json!({"owner_id": "u1", "kind": "project"});
        assert!(Filter::new().eq("owner_id", "u1").matches(&doc));
        assert!(!Filter::new().eq("owner_id", "u2").matches(&doc));
        assert!(!Filter::new().eq("missing", "x").matches(&doc));
        assert!(Filter::new().matches(&doc));
    }

    #[test]
    fn internal_errors_are_not_disclosed() {
        let e = BotmarketError::Internal("db socket closed".to_string());
        assert_eq!(e.status_code(), 500);
        assert_eq!(e.public_message(), "internal error");
        assert_eq!(BotmarketError::Forbidden("x".into()).status_code(), 403);
    }

    #[test]
    fn upstream_detail_is_not_disclosed() {
        let e = BotmarketError::connection(
            "github",
            "error sending request for url (https://github.com/login/oauth/access_token)",
        );
        assert_eq!(e.status_code(), 502);
        assert_eq!(e.public_message(), "github is unavailable");
        assert!(e.to_string().contains("access_token"));
    }

    #[test]
    fn saas_score_sums_votes() {
        let mut votes = BTreeMap::new();
        votes.insert("a".to_string(), 1);
        votes.insert("b".to_string(), 1);
        votes.insert("c".to_string(), -1);
        let s = SaasEntry {
            id: "s".into(),
            owner_id: "a".into(),
            name: "n".into(),
            url: "https://x".into(),
            description: String::new(),
            category: String::new(),
            votes,
            created_at: 0,
            updated_at: 0,
        };
        assert_eq!(s.score(), 1);
    }
}

use std::collections::BTreeMap;

use botmarket_api::{BotmarketError, Comment, CommentTarget, Filter, Principal, SaasEntry};
use serde::{Deserialize, Serialize};

use crate::projects::comment_filter;
use crate::{AppRuntime, max_len, new_id, now_secs, required};

const MAX_NAME: usize = 200;

#[derive(Debug, Clone, Deserialize)]
pub struct NewSaas {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SaasPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
}

/// Directory entry as served: the entry plus its computed score.
#[derive(Debug, Clone, Serialize)]
pub struct SaasView {
    #[serde(flatten)]
    pub entry: SaasEntry,
    pub score: i64,
}

impl From<SaasEntry> for SaasView {
    fn from(entry: SaasEntry) -> Self {
        let score = entry.score();
        Self { entry, score }
    }
}

fn check_url(raw: &str) -> Result<String, BotmarketError> {
    let url = required("url", raw)?;
    max_len("url", &url, 2_000)?;
    if !(url.starts_with("https://") || url.starts_with("http://")) {
        return Err(BotmarketError::Validation(
            "url must start with http:// or https://".to_string(),
        ));
    }
    Ok(url)
}

impl AppRuntime {
    /// Every entry, highest score first; ties newest first.
    pub fn list_saas(&self, category: Option<&str>) -> Result<Vec<SaasView>, BotmarketError> {
        let filter = match category {
            Some(c) => Filter::new().eq("category", c.trim().to_lowercase()),
            None => Filter::new(),
        };
        let mut views: Vec<SaasView> = self
            .list::<SaasEntry>(&filter)?
            .into_iter()
            .map(SaasView::from)
            .collect();
        // Stable sort keeps the newest-first order among equal scores.
        views.sort_by(|a, b| b.score.cmp(&a.score));
        Ok(views)
    }

    pub fn get_saas(&self, id: &str) -> Result<SaasView, BotmarketError> {
        self.load::<SaasEntry>(id).map(SaasView::from)
    }

    pub fn create_saas(&self, principal: &Principal, input: NewSaas) -> Result<SaasView, BotmarketError> {
        let name = required("name", &input.name)?;
        max_len("name", &name, MAX_NAME)?;
        max_len("description", &input.description, 10_000)?;
        let now = now_secs();
        self.create(SaasEntry {
            id: new_id(),
            owner_id: principal.id.clone(),
            name,
            url: check_url(&input.url)?,
            description: input.description.trim().to_string(),
            category: input.category.trim().to_lowercase(),
            votes: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        })
        .map(SaasView::from)
    }

    pub fn update_saas(
        &self,
        principal: &Principal,
        id: &str,
        patch: SaasPatch,
    ) -> Result<SaasView, BotmarketError> {
        let name = patch.name.as_deref().map(|n| required("name", n)).transpose()?;
        if let Some(n) = &name {
            max_len("name", n, MAX_NAME)?;
        }
        let url = patch.url.as_deref().map(check_url).transpose()?;
        if let Some(d) = &patch.description {
            max_len("description", d, 10_000)?;
        }

        self.modify(principal, id, |entry: &mut SaasEntry| {
            if let Some(n) = &name {
                entry.name.clone_from(n);
            }
            if let Some(u) = &url {
                entry.url.clone_from(u);
            }
            if let Some(d) = &patch.description {
                entry.description = d.trim().to_string();
            }
            if let Some(c) = &patch.category {
                entry.category = c.trim().to_lowercase();
            }
            entry.updated_at = now_secs();
            Ok(())
        })
        .map(SaasView::from)
    }

    pub fn delete_saas(&self, principal: &Principal, id: &str) -> Result<(), BotmarketError> {
        self.remove::<SaasEntry>(principal, id)?;
        self.purge::<Comment>(&comment_filter(CommentTarget::Saas, id))?;
        Ok(())
    }

    /// One vote per user: `1` or `-1` sets it, `0` withdraws it.
    pub fn vote_saas(
        &self,
        principal: &Principal,
        id: &str,
        value: i8,
    ) -> Result<SaasView, BotmarketError> {
        if !(-1..=1).contains(&value) {
            return Err(BotmarketError::Validation(
                "vote must be -1, 0 or 1".to_string(),
            ));
        }
        self.modify_as(id, |entry: &mut SaasEntry| {
            if value == 0 {
                entry.votes.remove(&principal.id);
            } else {
                entry.votes.insert(principal.id.clone(), value);
            }
            Ok(())
        })
        .map(SaasView::from)
    }
}

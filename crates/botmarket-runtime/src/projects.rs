use botmarket_api::{BotmarketError, Comment, CommentTarget, Filter, Principal, Project};
use serde::Deserialize;

use crate::{AppRuntime, max_len, new_id, now_secs, required};

const MAX_TAGS: usize = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct NewProject {
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Option<u64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProjectPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<u64>,
    pub tags: Option<Vec<String>>,
}

/// Lowercased, trimmed, deduplicated, order preserved.
fn normalize_tags(raw: &[String]) -> Result<Vec<String>, BotmarketError> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let t = tag.trim().to_lowercase();
        if !t.is_empty() && !tags.contains(&t) {
            max_len("tag", &t, 32)?;
            tags.push(t);
        }
    }
    if tags.len() > MAX_TAGS {
        return Err(BotmarketError::Validation(format!(
            "at most {MAX_TAGS} tags are allowed"
        )));
    }
    Ok(tags)
}

impl AppRuntime {
    pub fn list_projects(&self, owner: Option<&str>) -> Result<Vec<Project>, BotmarketError> {
        let filter = match owner {
            Some(owner) => Filter::new().eq("owner_id", owner),
            None => Filter::new(),
        };
        self.list(&filter)
    }

    pub fn get_project(&self, id: &str) -> Result<Project, BotmarketError> {
        self.load(id)
    }

    pub fn create_project(
        &self,
        principal: &Principal,
        input: NewProject,
    ) -> Result<Project, BotmarketError> {
        let title = required("title", &input.title)?;
        max_len("title", &title, 200)?;
        max_len("description", &input.description, 10_000)?;
        let now = now_secs();
        self.create(Project {
            id: new_id(),
            owner_id: principal.id.clone(),
            title,
            description: input.description.trim().to_string(),
            price: input.price,
            tags: normalize_tags(&input.tags)?,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_project(
        &self,
        principal: &Principal,
        id: &str,
        patch: ProjectPatch,
    ) -> Result<Project, BotmarketError> {
        let title = patch.title.as_deref().map(|t| required("title", t)).transpose()?;
        if let Some(t) = &title {
            max_len("title", t, 200)?;
        }
        if let Some(d) = &patch.description {
            max_len("description", d, 10_000)?;
        }
        let tags = patch.tags.as_deref().map(normalize_tags).transpose()?;

        self.modify(principal, id, |project: &mut Project| {
            if let Some(t) = &title {
                project.title.clone_from(t);
            }
            if let Some(d) = &patch.description {
                project.description = d.trim().to_string();
            }
            if patch.price.is_some() {
                project.price = patch.price;
            }
            if let Some(t) = &tags {
                project.tags.clone_from(t);
            }
            project.updated_at = now_secs();
            Ok(())
        })
    }

    /// Deletes the project and its comments.
    pub fn delete_project(&self, principal: &Principal, id: &str) -> Result<(), BotmarketError> {
        self.remove::<Project>(principal, id)?;
        let dropped = self.purge::<Comment>(&comment_filter(CommentTarget::Project, id))?;
        tracing::debug!(project_id = id, comments = dropped, "project deleted");
        Ok(())
    }
}

pub(crate) fn comment_filter(kind: CommentTarget, target_id: &str) -> Filter {
    let kind = match kind {
        CommentTarget::Project => "project",
        CommentTarget::Saas => "saas",
    };
    Filter::new()
        .eq("target_kind", kind)
        .eq("target_id", target_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CommentInput;
    use crate::testing::{runtime, user};

    fn listing(title: &str) -> NewProject {
        NewProject {
            title: title.to_string(),
            description: "A support bot".to_string(),
            price: Some(4900),
            tags: vec!["Support".to_string(), "support ".to_string(), "GPT".to_string()],
        }
    }

    #[test]
    fn create_normalizes_and_lists() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let bob = user(&rt, "bob@example.com");
        let p = rt.create_project(&ada, listing("Helpdesk")).unwrap();
        rt.create_project(&bob, listing("Other")).unwrap();

        assert_eq!(p.tags, vec!["support", "gpt"]);
        assert_eq!(rt.list_projects(None).unwrap().len(), 2);
        let mine = rt.list_projects(Some(&ada.id)).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, p.id);
    }

    #[test]
    fn empty_title_is_rejected() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let err = rt.create_project(&ada, listing("   ")).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn non_owner_cannot_mutate() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let bob = user(&rt, "bob@example.com");
        let p = rt.create_project(&ada, listing("Helpdesk")).unwrap();

        let patch = ProjectPatch {
            title: Some("Hijacked".to_string()),
            ..ProjectPatch::default()
        };
        assert_eq!(rt.update_project(&bob, &p.id, patch).unwrap_err().status_code(), 403);
        assert_eq!(rt.delete_project(&bob, &p.id).unwrap_err().status_code(), 403);
        assert_eq!(rt.get_project(&p.id).unwrap().title, "Helpdesk");
    }

    #[test]
    fn owner_updates_and_deletes_with_comments() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let bob = user(&rt, "bob@example.com");
        let p = rt.create_project(&ada, listing("Helpdesk")).unwrap();
        rt.add_comment(
            &bob,
            CommentTarget::Project,
            &p.id,
            CommentInput {
                body: "nice".to_string(),
            },
        )
        .unwrap();

        let updated = rt
            .update_project(
                &ada,
                &p.id,
                ProjectPatch {
                    price: Some(9900),
                    ..ProjectPatch::default()
                },
            )
            .unwrap();
        assert_eq!(updated.price, Some(9900));
        assert_eq!(updated.title, "Helpdesk");

        rt.delete_project(&ada, &p.id).unwrap();
        assert_eq!(rt.get_project(&p.id).unwrap_err().status_code(), 404);
        assert!(rt.store.find("comments", &Filter::new()).unwrap().is_empty());
    }
}

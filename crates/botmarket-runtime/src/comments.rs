use botmarket_api::{BotmarketError, Comment, CommentTarget, Principal, Project, SaasEntry};
use serde::Deserialize;

use crate::projects::comment_filter;
use crate::{AppRuntime, max_len, new_id, now_secs, required};

const MAX_BODY: usize = 5_000;

#[derive(Debug, Clone, Deserialize)]
pub struct CommentInput {
    pub body: String,
}

impl CommentInput {
    fn body(&self) -> Result<String, BotmarketError> {
        let body = required("body", &self.body)?;
        max_len("body", &body, MAX_BODY)?;
        Ok(body)
    }
}

impl AppRuntime {
    fn ensure_target(&self, kind: CommentTarget, target_id: &str) -> Result<(), BotmarketError> {
        match kind {
            CommentTarget::Project => self.load::<Project>(target_id).map(drop),
            CommentTarget::Saas => self.load::<SaasEntry>(target_id).map(drop),
        }
    }

    /// Comments on one target, oldest first.
    pub fn list_comments(
        &self,
        kind: CommentTarget,
        target_id: &str,
    ) -> Result<Vec<Comment>, BotmarketError> {
        self.ensure_target(kind, target_id)?;
        let mut comments: Vec<Comment> = self.list(&comment_filter(kind, target_id))?;
        comments.reverse();
        Ok(comments)
    }

    pub fn add_comment(
        &self,
        principal: &Principal,
        kind: CommentTarget,
        target_id: &str,
        input: CommentInput,
    ) -> Result<Comment, BotmarketError> {
        let body = input.body()?;
        self.ensure_target(kind, target_id)?;
        let now = now_secs();
        self.create(Comment {
            id: new_id(),
            owner_id: principal.id.clone(),
            target_kind: kind,
            target_id: target_id.to_string(),
            body,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn update_comment(
        &self,
        principal: &Principal,
        id: &str,
        input: CommentInput,
    ) -> Result<Comment, BotmarketError> {
        let body = input.body()?;
        self.modify(principal, id, |comment: &mut Comment| {
            comment.body.clone_from(&body);
            comment.updated_at = now_secs();
            Ok(())
        })
    }

    pub fn delete_comment(&self, principal: &Principal, id: &str) -> Result<(), BotmarketError> {
        self.remove::<Comment>(principal, id).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewProject;
    use crate::testing::{runtime, user};
    use std::sync::Arc;

    fn body(text: &str) -> CommentInput {
        CommentInput {
            body: text.to_string(),
        }
    }

    fn project(rt: &AppRuntime, owner: &Principal) -> Project {
        rt.create_project(
            owner,
            NewProject {
                title: "Helpdesk".to_string(),
                description: String::new(),
                price: None,
                tags: Vec::new(),
            },
        )
        .unwrap()
    }

    #[test]
    fn comment_requires_existing_target() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let err = rt
            .add_comment(&ada, CommentTarget::Project, "nope", body("hi"))
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        let err = rt
            .add_comment(&ada, CommentTarget::Saas, "nope", body("hi"))
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn empty_body_is_rejected() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let p = project(&rt, &ada);
        let err = rt
            .add_comment(&ada, CommentTarget::Project, &p.id, body("  "))
            .unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn only_author_edits_or_deletes() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let bob = user(&rt, "bob@example.com");
        let p = project(&rt, &ada);
        let c = rt
            .add_comment(&bob, CommentTarget::Project, &p.id, body("first"))
            .unwrap();

        // Owning the project does not grant rights over its comments.
        assert_eq!(rt.update_comment(&ada, &c.id, body("x")).unwrap_err().status_code(), 403);
        assert_eq!(rt.delete_comment(&ada, &c.id).unwrap_err().status_code(), 403);

        let edited = rt.update_comment(&bob, &c.id, body("edited")).unwrap();
        assert_eq!(edited.body, "edited");
        let listed = rt.list_comments(CommentTarget::Project, &p.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].body, "edited");

        rt.delete_comment(&bob, &c.id).unwrap();
        assert!(rt.list_comments(CommentTarget::Project, &p.id).unwrap().is_empty());
    }

    #[test]
    fn concurrent_owner_updates_last_write_wins() {
        let rt = Arc::new(runtime());
        let ada = user(&rt, "ada@example.com");
        let p = project(&rt, &ada);
        let c = rt
            .add_comment(&ada, CommentTarget::Project, &p.id, body("v0"))
            .unwrap();

        let handles: Vec<_> = (0..2)
            .map(|i| {
                let rt = rt.clone();
                let ada = ada.clone();
                let id = c.id.clone();
                std::thread::spawn(move || rt.update_comment(&ada, &id, body(&format!("v{}", i + 1))))
            })
            .collect();
        for h in handles {
            assert!(h.join().unwrap().is_ok());
        }

        let listed = rt.list_comments(CommentTarget::Project, &p.id).unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].body == "v1" || listed[0].body == "v2");
    }
}

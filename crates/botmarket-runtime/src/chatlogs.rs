use botmarket_api::{Bot, BotmarketError, ChatMessage, ChatRole, Chatlog, Filter, Principal};
use serde::Deserialize;

use crate::{AppRuntime, max_len, new_id, now_secs, required};

const MAX_MESSAGE: usize = 32_000;

#[derive(Debug, Clone, Deserialize)]
pub struct NewChatlog {
    pub bot_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewMessage {
    pub role: ChatRole,
    pub content: String,
}

impl AppRuntime {
    pub fn list_chatlogs(
        &self,
        principal: &Principal,
        bot_id: Option<&str>,
    ) -> Result<Vec<Chatlog>, BotmarketError> {
        let mut filter = Filter::new().eq("owner_id", principal.id.as_str());
        if let Some(bot) = bot_id {
            filter = filter.eq("bot_id", bot);
        }
        self.list(&filter)
    }

    pub fn get_chatlog(&self, principal: &Principal, id: &str) -> Result<Chatlog, BotmarketError> {
        self.load_owned(principal, id)
    }

    pub fn create_chatlog(
        &self,
        principal: &Principal,
        input: NewChatlog,
    ) -> Result<Chatlog, BotmarketError> {
        let bot: Bot = self.load_owned(principal, input.bot_id.trim())?;
        let now = now_secs();
        self.create(Chatlog {
            id: new_id(),
            owner_id: principal.id.clone(),
            bot_id: bot.id,
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn append_message(
        &self,
        principal: &Principal,
        id: &str,
        input: NewMessage,
    ) -> Result<Chatlog, BotmarketError> {
        let content = required("content", &input.content)?;
        max_len("content", &content, MAX_MESSAGE)?;
        self.modify(principal, id, |log: &mut Chatlog| {
            let at = now_secs();
            log.messages.push(ChatMessage {
                role: input.role,
                content: content.clone(),
                at,
            });
            log.updated_at = at;
            Ok(())
        })
    }

    pub fn delete_chatlog(&self, principal: &Principal, id: &str) -> Result<(), BotmarketError> {
        self.remove::<Chatlog>(principal, id).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewBot;
    use crate::testing::{runtime, user};

    fn bot(rt: &AppRuntime, owner: &Principal) -> Bot {
        rt.create_bot(
            owner,
            NewBot {
                name: "Helper".to_string(),
                description: String::new(),
                model: "gpt-4o".to_string(),
                credential_id: None,
                system_prompt: None,
            },
        )
        .unwrap()
    }

    fn say(role: ChatRole, content: &str) -> NewMessage {
        NewMessage {
            role,
            content: content.to_string(),
        }
    }

    #[test]
    fn messages_append_in_order() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let b = bot(&rt, &ada);
        let log = rt
            .create_chatlog(&ada, NewChatlog { bot_id: b.id.clone() })
            .unwrap();

        rt.append_message(&ada, &log.id, say(ChatRole::User, "hi")).unwrap();
        let log = rt
            .append_message(&ada, &log.id, say(ChatRole::Assistant, "hello"))
            .unwrap();
        let roles: Vec<_> = log.messages.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![ChatRole::User, ChatRole::Assistant]);
        assert_eq!(rt.list_chatlogs(&ada, Some(&b.id)).unwrap().len(), 1);
        assert!(rt.list_chatlogs(&ada, Some("other")).unwrap().is_empty());
    }

    #[test]
    fn bot_must_belong_to_caller() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let bob = user(&rt, "bob@example.com");
        let b = bot(&rt, &ada);
        let err = rt
            .create_chatlog(&bob, NewChatlog { bot_id: b.id })
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn chatlogs_are_private_and_unchanged_by_strangers() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let bob = user(&rt, "bob@example.com");
        let b = bot(&rt, &ada);
        let log = rt.create_chatlog(&ada, NewChatlog { bot_id: b.id }).unwrap();

        assert_eq!(rt.get_chatlog(&bob, &log.id).unwrap_err().status_code(), 404);
        let err = rt
            .append_message(&bob, &log.id, say(ChatRole::User, "sneaky"))
            .unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert!(rt.get_chatlog(&ada, &log.id).unwrap().messages.is_empty());
    }

    #[test]
    fn deleting_bot_drops_its_chatlogs() {
        let rt = runtime();
        let ada = user(&rt, "ada@example.com");
        let b = bot(&rt, &ada);
        let log = rt
            .create_chatlog(&ada, NewChatlog { bot_id: b.id.clone() })
            .unwrap();
        rt.delete_bot(&ada, &b.id).unwrap();
        assert_eq!(rt.get_chatlog(&ada, &log.id).unwrap_err().status_code(), 404);
    }
}

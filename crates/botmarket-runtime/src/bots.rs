use botmarket_api::{Bot, BotmarketError, Chatlog, Credential, Filter, Principal};
use serde::Deserialize;

use crate::{AppRuntime, max_len, new_id, now_secs, required};

const MAX_NAME: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct NewBot {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub model: String,
    #[serde(default)]
    pub credential_id: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct BotPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub model: Option<String>,
    pub credential_id: Option<String>,
    pub system_prompt: Option<String>,
}

impl AppRuntime {
    /// A bot may only point at a credential its owner holds.
    fn check_credential(&self, principal: &Principal, id: Option<&str>) -> Result<(), BotmarketError> {
        if let Some(id) = id {
            self.load_owned::<Credential>(principal, id).map_err(|e| match e {
                BotmarketError::NotFound(_) => {
                    BotmarketError::Validation(format!("credential {id} does not exist"))
                }
                other => other,
            })?;
        }
        Ok(())
    }

    pub fn list_bots(&self, principal: &Principal) -> Result<Vec<Bot>, BotmarketError> {
        self.list_owned(principal)
    }

    pub fn get_bot(&self, principal: &Principal, id: &str) -> Result<Bot, BotmarketError> {
        self.load_owned(principal, id)
    }

    pub fn create_bot(&self, principal: &Principal, input: NewBot) -> Result<Bot, BotmarketError> {
        let name = required("name", &input.name)?;
        max_len("name", &name, MAX_NAME)?;
        let model = required("model", &input.model)?;
        let credential_id = input
            .credential_id
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        self.check_credential(principal, credential_id)?;

        let now = now_secs();
        self.create(Bot {
            id: new_id(),
            owner_id: principal.id.clone(),
            name,
            description: input.description.trim().to_string(),
            model,
            credential_id: credential_id.map(str::to_string),
            system_prompt: input.system_prompt.filter(|p| !p.trim().is_empty()),
            created_at: now,
            updated_at: now,
        })
    }

    /// An empty `credential_id` or `system_prompt` in the patch clears the field.
    pub fn update_bot(
        &self,
        principal: &Principal,
        id: &str,
        patch: BotPatch,
    ) -> Result<Bot, BotmarketError> {
        let name = patch.name.as_deref().map(|n| required("name", n)).transpose()?;
        if let Some(n) = &name {
            max_len("name", n, MAX_NAME)?;
        }
        let model = patch.model.as_deref().map(|m| required("model", m)).transpose()?;
        let credential_id = patch.credential_id.as_deref().map(str::trim);
        self.check_credential(principal, credential_id.filter(|c| !c.is_empty()))?;

        self.modify(principal, id, |bot: &mut Bot| {
            if let Some(n) = &name {
                bot.name.clone_from(n);
            }
            if let Some(m) = &model {
                bot.model.clone_from(m);
            }
            if let Some(d) = &patch.description {
                bot.description = d.trim().to_string();
            }
            if let Some(c) = credential_id {
                bot.credential_id = (!c.is_empty()).then(|| c.to_string());
            }
            if let Some(p) = &patch.system_prompt {
                bot.system_prompt = (!p.trim().is_empty()).then(|| p.clone());
            }
            bot.updated_at = now_secs();
            Ok(())
        })
    }

    /// Deletes the bot and every chatlog recorded against it.
    pub fn delete_bot(&self, principal: &Principal, id: &str) -> Result<(), BotmarketError> {
        self.remove::<Bot>(principal, id)?;
        self.purge::<Chatlog>(&Filter::new().eq("bot_id", id))?;
        Ok(())
    }
}

use botmarket_api::{BotmarketError, Credential, Principal};
use serde::Deserialize;

use crate::{AppRuntime, max_len, new_id, now_secs, required};

const MAX_LABEL: usize = 100;

#[derive(Debug, Clone, Deserialize)]
pub struct NewCredential {
    pub label: String,
    pub provider: String,
    pub secret: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CredentialPatch {
    pub label: Option<String>,
    pub secret: Option<String>,
}

// Credentials are only ever returned masked.
impl AppRuntime {
    pub fn list_credentials(&self, principal: &Principal) -> Result<Vec<Credential>, BotmarketError> {
        Ok(self
            .list_owned::<Credential>(principal)?
            .iter()
            .map(Credential::masked)
            .collect())
    }

    pub fn get_credential(&self, principal: &Principal, id: &str) -> Result<Credential, BotmarketError> {
        Ok(self.load_owned::<Credential>(principal, id)?.masked())
    }

    pub fn create_credential(
        &self,
        principal: &Principal,
        input: NewCredential,
    ) -> Result<Credential, BotmarketError> {
        let label = required("label", &input.label)?;
        max_len("label", &label, MAX_LABEL)?;
        let provider = required("provider", &input.provider)?.to_lowercase();
        let secret = required("secret", &input.secret)?;
        let now = now_secs();
        let created = self.create(Credential {
            id: new_id(),
            owner_id: principal.id.clone(),
            label,
            provider,
            secret,
            created_at: now,
            updated_at: now,
        })?;
        Ok(created.masked())
    }

    pub fn update_credential(
        &self,
        principal: &Principal,
        id: &str,
        patch: CredentialPatch,
    ) -> Result<Credential, BotmarketError> {
        let label = patch.label.as_deref().map(|l| required("label", l)).transpose()?;
        if let Some(l) = &label {
            max_len("label", l, MAX_LABEL)?;
        }
        let secret = patch.secret.as_deref().map(|s| required("secret", s)).transpose()?;
        let updated = self.modify(principal, id, |cred: &mut Credential| {
            if let Some(l) = &label {
                cred.label.clone_from(l);
            }
            if let Some(s) = &secret {
                cred.secret.clone_from(s);
            }
            cred.updated_at = now_secs();
            Ok(())
        })?;
        Ok(updated.masked())
    }

    pub fn delete_credential(&self, principal: &Principal, id: &str) -> Result<(), BotmarketError> {
        self.remove::<Credential>(principal, id).map(drop)
    }
}

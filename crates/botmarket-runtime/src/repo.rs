//! Typed access to the document store shared by every resource service.

use botmarket_api::{
    Bot, BotmarketError, Chatlog, Comment, Credential, Filter, Principal, Project, SaasEntry,
};
use botmarket_auth::assert_owner;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::AppRuntime;

pub(crate) trait Record: Serialize + DeserializeOwned {
    const COLLECTION: &'static str;
    const KIND: &'static str;
    /// Foreign records report `NotFound` instead of `Forbidden`.
    const PRIVATE: bool = false;

    fn id(&self) -> &str;
    fn owner_id(&self) -> &str;
    fn created_at(&self) -> u64;
}

macro_rules! record {
    ($ty:ty, $coll:literal, $kind:literal, private = $private:literal) => {
        impl Record for $ty {
            const COLLECTION: &'static str = $coll;
            const KIND: &'static str = $kind;
            const PRIVATE: bool = $private;

            fn id(&self) -> &str {
                &self.id
            }

            fn owner_id(&self) -> &str {
                &self.owner_id
            }

            fn created_at(&self) -> u64 {
                self.created_at
            }
        }
    };
}

record!(Project, "projects", "project", private = false);
record!(Comment, "comments", "comment", private = false);
record!(SaasEntry, "saas", "saas entry", private = false);
record!(Credential, "credentials", "credential", private = true);
record!(Bot, "bots", "bot", private = true);
record!(Chatlog, "chatlogs", "chatlog", private = true);

pub(crate) fn not_found<R: Record>(id: &str) -> BotmarketError {
    BotmarketError::NotFound(format!("{} {id} not found", R::KIND))
}

fn decode<R: Record>(doc: Value) -> Result<R, BotmarketError> {
    serde_json::from_value(doc)
        .map_err(|e| BotmarketError::Internal(format!("corrupt {} document: {e}", R::KIND)))
}

fn encode<R: Record>(record: &R) -> Result<Value, BotmarketError> {
    serde_json::to_value(record)
        .map_err(|e| BotmarketError::Internal(format!("encode {}: {e}", R::KIND)))
}

/// Ownership check with existence hiding for private records.
fn check_owner<R: Record>(principal: &Principal, record: &R) -> Result<(), BotmarketError> {
    match assert_owner(principal, record.owner_id()) {
        Err(_) if R::PRIVATE => Err(not_found::<R>(record.id())),
        other => other,
    }
}

impl AppRuntime {
    pub(crate) fn load<R: Record>(&self, id: &str) -> Result<R, BotmarketError> {
        match self.store.get(R::COLLECTION, id)? {
            Some(doc) => decode(doc),
            None => Err(not_found::<R>(id)),
        }
    }

    pub(crate) fn load_owned<R: Record>(
        &self,
        principal: &Principal,
        id: &str,
    ) -> Result<R, BotmarketError> {
        let record: R = self.load(id)?;
        check_owner(principal, &record)?;
        Ok(record)
    }

    /// Matching records, newest first.
    pub(crate) fn list<R: Record>(&self, filter: &Filter) -> Result<Vec<R>, BotmarketError> {
        let mut out = self
            .store
            .find(R::COLLECTION, filter)?
            .into_iter()
            .map(decode)
            .collect::<Result<Vec<R>, _>>()?;
        out.sort_by(|a, b| {
            b.created_at()
                .cmp(&a.created_at())
                .then_with(|| a.id().cmp(b.id()))
        });
        Ok(out)
    }

    pub(crate) fn list_owned<R: Record>(&self, principal: &Principal) -> Result<Vec<R>, BotmarketError> {
        self.list(&Filter::new().eq("owner_id", principal.id.as_str()))
    }

    pub(crate) fn create<R: Record>(&self, record: R) -> Result<R, BotmarketError> {
        self.store.insert(R::COLLECTION, record.id(), encode(&record)?)?;
        tracing::debug!(kind = R::KIND, id = record.id(), "record created");
        Ok(record)
    }

    /// Owner-only read-modify-write. The ownership check runs inside the
    /// store's atomic update, so a rejected caller never changes the record.
    pub(crate) fn modify<R: Record>(
        &self,
        principal: &Principal,
        id: &str,
        mut apply: impl FnMut(&mut R) -> Result<(), BotmarketError>,
    ) -> Result<R, BotmarketError> {
        self.modify_as(id, |record: &mut R| {
            check_owner(principal, record)?;
            apply(record)
        })
    }

    /// Read-modify-write without an ownership check (votes, message appends
    /// already authorized by the caller).
    pub(crate) fn modify_as<R: Record>(
        &self,
        id: &str,
        mut apply: impl FnMut(&mut R) -> Result<(), BotmarketError>,
    ) -> Result<R, BotmarketError> {
        let updated = self.store.update(R::COLLECTION, id, &mut |doc| {
            let mut record: R = decode(doc.clone())?;
            apply(&mut record)?;
            *doc = encode(&record)?;
            Ok(())
        })?;
        match updated {
            Some(doc) => decode(doc),
            None => Err(not_found::<R>(id)),
        }
    }

    pub(crate) fn remove<R: Record>(&self, principal: &Principal, id: &str) -> Result<R, BotmarketError> {
        let record: R = self.load_owned(principal, id)?;
        self.store.delete(R::COLLECTION, id)?;
        tracing::debug!(kind = R::KIND, id, "record deleted");
        Ok(record)
    }

    /// Delete every record matching `filter`; used for cascades.
    pub(crate) fn purge<R: Record>(&self, filter: &Filter) -> Result<usize, BotmarketError> {
        let mut removed = 0;
        for record in self.list::<R>(filter)? {
            if self.store.delete(R::COLLECTION, record.id())? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

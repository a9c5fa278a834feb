use botmarket_api::{BotmarketError, DocumentStore, Filter};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use serde_json::Value;

/// In-process document store. Each document sits behind its own shard lock,
/// so single-document operations are atomic and concurrent writers to the
/// same document are serialized (last write wins).
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: DashMap<String, DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, collection: &str) -> usize {
        self.collections.get(collection).map_or(0, |c| c.len())
    }

    pub fn is_empty(&self, collection: &str) -> bool {
        self.len(collection) == 0
    }
}

impl DocumentStore for MemoryStore {
    fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<(), BotmarketError> {
        if !doc.is_object() {
            return Err(BotmarketError::Validation(format!(
                "{collection} documents must be JSON objects"
            )));
        }
        let coll = self
            .collections
            .entry(collection.to_string())
            .or_default()
            .downgrade();
        match coll.entry(id.to_string()) {
            Entry::Occupied(_) => Err(BotmarketError::Conflict(format!(
                "{collection}/{id} already exists"
            ))),
            Entry::Vacant(slot) => {
                slot.insert(doc);
                Ok(())
            }
        }
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, BotmarketError> {
        Ok(self
            .collections
            .get(collection)
            .and_then(|c| c.get(id).map(|d| d.value().clone())))
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, BotmarketError> {
        let Some(coll) = self.collections.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(coll
            .iter()
            .filter(|d| filter.matches(d.value()))
            .map(|d| d.value().clone())
            .collect())
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        apply: &mut dyn FnMut(&mut Value) -> Result<(), BotmarketError>,
    ) -> Result<Option<Value>, BotmarketError> {
        let Some(coll) = self.collections.get(collection) else {
            return Ok(None);
        };
        let Some(mut entry) = coll.get_mut(id) else {
            return Ok(None);
        };
        // Work on a copy so a failing `apply` leaves the stored document untouched.
        let mut next = entry.value().clone();
        apply(&mut next)?;
        *entry.value_mut() = next.clone();
        Ok(Some(next))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, BotmarketError> {
        Ok(self
            .collections
            .get(collection)
            .is_some_and(|c| c.remove(id).is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[test]
    fn insert_get_find_delete() {
        let store = MemoryStore::new();
        store.insert("bots", "b1", json!({"id": "b1", "owner_id": "u1"})).unwrap();
        store.insert("bots", "b2", json!({"id": "b2", "owner_id": "u2"})).unwrap();

        assert_eq!(store.get("bots", "b1").unwrap().unwrap()["owner_id"], "u1");
        assert!(store.get("bots", "nope").unwrap().is_none());
        assert!(store.get("other", "b1").unwrap().is_none());

        let mine = store.find("bots", &Filter::new().eq("owner_id", "u1")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(store.find("bots", &Filter::new()).unwrap().len(), 2);

        assert!(store.delete("bots", "b1").unwrap());
        assert!(!store.delete("bots", "b1").unwrap());
        assert_eq!(store.len("bots"), 1);
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let store = MemoryStore::new();
        store.insert("users", "u1", json!({"id": "u1"})).unwrap();
        assert!(matches!(
            store.insert("users", "u1", json!({"id": "u1"})),
            Err(BotmarketError::Conflict(_))
        ));
    }

    #[test]
    fn non_object_is_rejected() {
        let store = MemoryStore::new();
        assert!(store.insert("users", "u1", json!([1, 2])).is_err());
    }

    #[test]
    fn failed_update_leaves_document_alone() {
        let store = MemoryStore::new();
        store.insert("c", "1", json!({"body": "old"})).unwrap();
        let res = store.update("c", "1", &mut |doc| {
            doc["body"] = json!("half-written");
            Err(BotmarketError::Validation("nope".to_string()))
        });
        assert!(res.is_err());
        assert_eq!(store.get("c", "1").unwrap().unwrap()["body"], "old");
        assert!(store.update("c", "missing", &mut |_| Ok(())).unwrap().is_none());
    }

    #[test]
    fn concurrent_updates_all_apply() {
        let store = Arc::new(MemoryStore::new());
        store.insert("c", "1", json!({"n": 0})).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        store
                            .update("c", "1", &mut |doc| {
                                let n = doc["n"].as_i64().unwrap_or(0);
                                doc["n"] = json!(n + 1);
                                Ok(())
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.get("c", "1").unwrap().unwrap()["n"], 800);
    }
}

//! SQLite-backed document store.
//!
//! One table, `documents(collection, id, body)`, with each document kept as
//! JSON text. A single connection sits behind a mutex, so every call sees and
//! writes one document atomically.

use std::path::Path;

use botmarket_api::{BotmarketError, DocumentStore, Filter};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, params};
use serde_json::Value;

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn sql_error(e: rusqlite::Error) -> BotmarketError {
    BotmarketError::Internal(format!("sqlite: {e}"))
}

fn decode(collection: &str, id: &str, body: &str) -> Result<Value, BotmarketError> {
    serde_json::from_str(body)
        .map_err(|e| BotmarketError::Internal(format!("corrupt document {collection}/{id}: {e}")))
}

impl SqliteStore {
    /// Open (or create) the database at `path`, creating missing parent directories.
    pub fn open(path: &Path) -> Result<Self, BotmarketError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                BotmarketError::Internal(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        let conn = Connection::open(path).map_err(sql_error)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(sql_error)?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                PRIMARY KEY (collection, id)
            );",
        )
        .map_err(sql_error)?;

        tracing::info!(path = %path.display(), "document store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn len(&self, collection: &str) -> Result<usize, BotmarketError> {
        let conn = self.conn.lock();
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM documents WHERE collection = ?1",
                params![collection],
                |row| row.get(0),
            )
            .map_err(sql_error)?;
        Ok(usize::try_from(n).unwrap_or(0))
    }
}

impl DocumentStore for SqliteStore {
    fn insert(&self, collection: &str, id: &str, doc: Value) -> Result<(), BotmarketError> {
        if !doc.is_object() {
            return Err(BotmarketError::Validation(format!(
                "{collection} documents must be JSON objects"
            )));
        }
        let conn = self.conn.lock();
        let inserted = conn
            .execute(
                "INSERT OR IGNORE INTO documents (collection, id, body) VALUES (?1, ?2, ?3)",
                params![collection, id, doc.to_string()],
            )
            .map_err(sql_error)?;
        if inserted == 0 {
            return Err(BotmarketError::Conflict(format!(
                "{collection}/{id} already exists"
            )));
        }
        Ok(())
    }

    fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, BotmarketError> {
        let conn = self.conn.lock();
        let body: Option<String> = conn
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_error)?;
        body.map(|b| decode(collection, id, &b)).transpose()
    }

    fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Value>, BotmarketError> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT id, body FROM documents WHERE collection = ?1 ORDER BY rowid")
            .map_err(sql_error)?;
        let rows = stmt
            .query_map(params![collection], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(sql_error)?;

        let mut docs = Vec::new();
        for row in rows {
            let (id, body) = row.map_err(sql_error)?;
            let doc = decode(collection, &id, &body)?;
            if filter.matches(&doc) {
                docs.push(doc);
            }
        }
        Ok(docs)
    }

    fn update(
        &self,
        collection: &str,
        id: &str,
        apply: &mut dyn FnMut(&mut Value) -> Result<(), BotmarketError>,
    ) -> Result<Option<Value>, BotmarketError> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction().map_err(sql_error)?;
        let body: Option<String> = tx
            .query_row(
                "SELECT body FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
                |row| row.get(0),
            )
            .optional()
            .map_err(sql_error)?;
        let Some(body) = body else {
            return Ok(None);
        };

        // Dropping `tx` on an `apply` error rolls back; nothing was written yet.
        let mut doc = decode(collection, id, &body)?;
        apply(&mut doc)?;
        tx.execute(
            "UPDATE documents SET body = ?3 WHERE collection = ?1 AND id = ?2",
            params![collection, id, doc.to_string()],
        )
        .map_err(sql_error)?;
        tx.commit().map_err(sql_error)?;
        Ok(Some(doc))
    }

    fn delete(&self, collection: &str, id: &str) -> Result<bool, BotmarketError> {
        let conn = self.conn.lock();
        let removed = conn
            .execute(
                "DELETE FROM documents WHERE collection = ?1 AND id = ?2",
                params![collection, id],
            )
            .map_err(sql_error)?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn test_store() -> (TempDir, SqliteStore) {
        let tmp = TempDir::new().unwrap();
        let store = SqliteStore::open(&tmp.path().join("store.db")).unwrap();
        (tmp, store)
    }

    #[test]
    fn reopen_keeps_records() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("botmarket.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert("users", "u1", json!({"id": "u1", "name": "Ada"})).unwrap();
            store.insert("users", "u2", json!({"id": "u2", "name": "Bob"})).unwrap();
            store
                .update("users", "u1", &mut |doc| {
                    doc["name"] = json!("Ada Lovelace");
                    Ok(())
                })
                .unwrap();
            assert!(store.delete("users", "u2").unwrap());
        }

        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.get("users", "u1").unwrap().unwrap()["name"], "Ada Lovelace");
        assert!(store.get("users", "u2").unwrap().is_none());
        assert_eq!(store.len("users").unwrap(), 1);
    }

    #[test]
    fn insert_get_find_delete() {
        let (_tmp, store) = test_store();
        store.insert("bots", "b1", json!({"id": "b1", "owner_id": "u1"})).unwrap();
        store.insert("bots", "b2", json!({"id": "b2", "owner_id": "u2"})).unwrap();

        assert_eq!(store.get("bots", "b1").unwrap().unwrap()["owner_id"], "u1");
        assert!(store.get("other", "b1").unwrap().is_none());

        let mine = store.find("bots", &Filter::new().eq("owner_id", "u1")).unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(store.find("bots", &Filter::new()).unwrap().len(), 2);
        assert!(store.find("nothing", &Filter::new()).unwrap().is_empty());

        assert!(store.delete("bots", "b1").unwrap());
        assert!(!store.delete("bots", "b1").unwrap());
    }

    #[test]
    fn duplicate_insert_conflicts() {
        let (_tmp, store) = test_store();
        store.insert("users", "u1", json!({"id": "u1", "v": 1})).unwrap();
        assert!(matches!(
            store.insert("users", "u1", json!({"id": "u1", "v": 2})),
            Err(BotmarketError::Conflict(_))
        ));
        assert_eq!(store.get("users", "u1").unwrap().unwrap()["v"], 1);
        assert!(store.insert("users", "u2", json!("text")).is_err());
    }

    #[test]
    fn failed_update_leaves_document_alone() {
        let (_tmp, store) = test_store();
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
        let (_tmp, store) = test_store();
        let store = Arc::new(store);
        store.insert("c", "1", json!({"n": 0})).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
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
        assert_eq!(store.get("c", "1").unwrap().unwrap()["n"], 200);
    }
}

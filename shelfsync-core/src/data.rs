// Document store: named JSON collections, fully rewritten on each save
use crate::error::Result;
use crate::model::{CatalogEntry, Competitor};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

pub const COMPETITORS: &str = "competitors";
pub const CATALOG: &str = "catalog";
pub const PROGRESS: &str = "progress";

/// Load/save over named collections.
///
/// There is no read-modify-write transaction: two callers that load, edit and
/// save the same collection concurrently can lose one of the edits.
pub trait DocumentStore: Send + Sync {
    fn load(&self, collection: &str) -> Result<Option<Value>>;
    fn save(&self, collection: &str, document: &Value) -> Result<()>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

fn current_timestamp() -> i64 {
    chrono::Utc::now().timestamp()
}

impl Database {
    pub fn drop(path: &Path) -> std::io::Result<()> {
        fs::remove_file(path)
    }

    pub fn exists(path: &Path) -> bool {
        path.exists()
    }

    pub fn new(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            ",
        )?;

        let db = Database {
            conn: Mutex::new(conn),
        };
        db.init_schema()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn init_schema(&self) -> Result<()> {
        self.conn().execute_batch(
            "
            CREATE TABLE IF NOT EXISTS documents (
                name TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            ",
        )?;
        Ok(())
    }

    /// Collection names with their last write time, oldest first.
    pub fn collections(&self) -> Result<Vec<(String, i64)>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT name, updated_at FROM documents ORDER BY updated_at, name")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl DocumentStore for Database {
    fn load(&self, collection: &str) -> Result<Option<Value>> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM documents WHERE name = ?1",
                params![collection],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    fn save(&self, collection: &str, document: &Value) -> Result<()> {
        let body = serde_json::to_string(document)?;
        self.conn().execute(
            "INSERT INTO documents (name, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(name) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![collection, &body, current_timestamp()],
        )?;
        debug!("Saved collection '{}' ({} bytes)", collection, body.len());
        Ok(())
    }
}

/// Store kept in process memory.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<HashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl DocumentStore for MemoryStore {
    fn load(&self, collection: &str) -> Result<Option<Value>> {
        let documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(documents.get(collection).cloned())
    }

    fn save(&self, collection: &str, document: &Value) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        documents.insert(collection.to_string(), document.clone());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CompetitorsDoc {
    #[serde(default)]
    competitors: Vec<Competitor>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDoc {
    #[serde(default)]
    products: Vec<CatalogEntry>,
}

pub fn load_competitors(store: &dyn DocumentStore) -> Result<Vec<Competitor>> {
    match store.load(COMPETITORS)? {
        Some(doc) => Ok(serde_json::from_value::<CompetitorsDoc>(doc)?.competitors),
        None => Ok(Vec::new()),
    }
}

pub fn save_competitors(store: &dyn DocumentStore, competitors: &[Competitor]) -> Result<()> {
    store.save(COMPETITORS, &json!({ "competitors": competitors }))
}

pub fn load_catalog(store: &dyn DocumentStore) -> Result<Vec<CatalogEntry>> {
    match store.load(CATALOG)? {
        Some(doc) => Ok(serde_json::from_value::<CatalogDoc>(doc)?.products),
        None => Ok(Vec::new()),
    }
}

pub fn save_catalog(store: &dyn DocumentStore, products: &[CatalogEntry]) -> Result<()> {
    store.save(CATALOG, &json!({ "products": products }))
}

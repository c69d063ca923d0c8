// Shared fixtures for the integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::Value;
use shelfsync_core::data::{Database, DocumentStore, MemoryStore};
use shelfsync_core::error::{CoreError, Result as CoreResult};
use shelfsync_scanner::error::Result as ScanResult;
use shelfsync_scanner::{
    Extracted, ExtractionService, PagePurpose, ProductDetail, RawCategory, RawListing, RawProduct,
    RawTreeNode, ScanError,
};
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::Mutex;
use tempfile::TempDir;

pub fn create_test_db() -> (TempDir, Database) {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("test.db");
    let db = Database::new(&db_path).unwrap();
    (temp_dir, db)
}

/// In-memory store whose saves to chosen collections fail.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    broken: Mutex<HashSet<String>>,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn break_saves(&self, collection: &str) {
        self.broken.lock().unwrap().insert(collection.to_string());
    }
}

impl DocumentStore for FlakyStore {
    fn load(&self, collection: &str) -> CoreResult<Option<Value>> {
        self.inner.load(collection)
    }

    fn save(&self, collection: &str, document: &Value) -> CoreResult<()> {
        if self.broken.lock().unwrap().contains(collection) {
            return Err(CoreError::Io(io::Error::other("disk full")));
        }
        self.inner.save(collection, document)
    }
}

/// Canned answer for one URL.
#[derive(Clone)]
pub enum Script {
    Listing(RawListing),
    Tree(Vec<RawTreeNode>),
    Detail(ProductDetail),
    NotFound,
    Down(String),
}

/// Extraction service answering from a fixed URL table. Unknown URLs are 404.
#[derive(Default)]
pub struct ScriptedService {
    pages: Mutex<HashMap<String, Script>>,
    calls: Mutex<Vec<(String, PagePurpose)>>,
}

impl ScriptedService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, url: &str, script: Script) -> Self {
        self.set(url, script);
        self
    }

    pub fn set(&self, url: &str, script: Script) {
        self.pages.lock().unwrap().insert(url.to_string(), script);
    }

    pub fn calls(&self) -> Vec<(String, PagePurpose)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExtractionService for ScriptedService {
    async fn extract(&self, url: &str, purpose: PagePurpose) -> ScanResult<Extracted> {
        self.calls.lock().unwrap().push((url.to_string(), purpose));
        let script = self.pages.lock().unwrap().get(url).cloned();
        match script {
            Some(Script::Listing(listing)) => Ok(Extracted::Listing(listing)),
            Some(Script::Tree(nodes)) => Ok(Extracted::Tree(nodes)),
            Some(Script::Detail(detail)) => Ok(Extracted::Detail(detail)),
            Some(Script::Down(message)) => Err(ScanError::Transient {
                url: url.to_string(),
                attempts: 3,
                message,
            }),
            Some(Script::NotFound) | None => Err(ScanError::NotFound(url.to_string())),
        }
    }
}

pub fn product(name: &str, url: &str) -> RawProduct {
    RawProduct {
        name: Some(name.to_string()),
        url: Some(url.to_string()),
        ..RawProduct::default()
    }
}

pub fn category(name: &str, url: &str) -> RawCategory {
    RawCategory {
        name: Some(name.to_string()),
        url: Some(url.to_string()),
    }
}

pub fn listing(page_type: Option<&str>, products: Vec<RawProduct>, categories: Vec<RawCategory>) -> RawListing {
    RawListing {
        page_type: page_type.map(String::from),
        products,
        categories,
    }
}

pub fn tree_node(name: &str, url: &str, children: Vec<RawTreeNode>) -> RawTreeNode {
    RawTreeNode {
        id: None,
        name: Some(name.to_string()),
        url: Some(url.to_string()),
        children,
    }
}

pub mod firestore;
pub mod value;

use crate::error::{LoaderError, Result};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

pub use firestore::FirestoreStore;

/// Field map of one document.
pub type Fields = Map<String, Value>;

/// Slash-separated path of alternating collection and document ids,
/// e.g. `dados/2020/Renda/baixa/uf/SP`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(Vec<String>);

impl DocPath {
    pub fn collection(name: &str) -> Self {
        Self(vec![name.to_string()])
    }

    /// Appends one segment. Slashes inside a segment are replaced so it stays a single id.
    pub fn child(mut self, segment: &str) -> Self {
        self.0.push(segment.replace('/', "-"));
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_document(&self) -> bool {
        !self.0.is_empty() && self.0.len() % 2 == 0
    }

    pub fn is_collection(&self) -> bool {
        self.0.len() % 2 == 1
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

/// Document database the pipelines write into.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Adds a document with a store-generated id under `collection`; returns its path.
    async fn create(&self, collection: &DocPath, fields: &Fields) -> Result<DocPath>;

    /// Creates or fully replaces the document at `document`.
    async fn set(&self, document: &DocPath, fields: &Fields) -> Result<()>;
}

fn check_collection(path: &DocPath) -> Result<()> {
    if path.is_collection() {
        Ok(())
    } else {
        Err(LoaderError::Config(format!("'{}' is not a collection path", path)))
    }
}

fn check_document(path: &DocPath) -> Result<()> {
    if path.is_document() {
        Ok(())
    } else {
        Err(LoaderError::Config(format!("'{}' is not a document path", path)))
    }
}

/// In-memory store for dry runs and tests.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    documents: Arc<Mutex<BTreeMap<DocPath, Fields>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, path: &DocPath) -> Option<Fields> {
        self.documents.lock().ok()?.get(path).cloned()
    }

    /// Every stored document, ordered by path.
    pub fn documents(&self) -> Vec<(DocPath, Fields)> {
        self.documents
            .lock()
            .map(|d| d.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default()
    }

    fn insert(&self, path: DocPath, fields: &Fields) -> Result<()> {
        let mut docs = self
            .documents
            .lock()
            .map_err(|_| LoaderError::StoreUnavailable("in-memory store lock poisoned".into()))?;
        docs.insert(path, fields.clone());
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn create(&self, collection: &DocPath, fields: &Fields) -> Result<DocPath> {
        check_collection(collection)?;
        let path = collection.clone().child(&Uuid::new_v4().simple().to_string());
        self.insert(path.clone(), fields)?;
        debug!("Created document {}", path);
        Ok(path)
    }

    async fn set(&self, document: &DocPath, fields: &Fields) -> Result<()> {
        check_document(document)?;
        self.insert(document.clone(), fields)?;
        debug!("Set document {}", document);
        Ok(())
    }
}

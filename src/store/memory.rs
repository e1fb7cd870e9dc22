//! In-memory store backend, used by tests and local development.

use super::{
    apply_patch, matches_filter, Document, EntityId, Store, StoreError,
};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::RwLock;

type Collection = BTreeMap<String, Document>;

/// Ordered in-memory collections behind a process-local lock. Iteration is
/// in id order, so "first match" is deterministic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<String, Collection>>, StoreError>
    {
        self.collections
            .read()
            .map_err(|_| StoreError::backend(anyhow::anyhow!("store lock poisoned")))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, Collection>>, StoreError> {
        self.collections
            .write()
            .map_err(|_| StoreError::backend(anyhow::anyhow!("store lock poisoned")))
    }
}

fn first_match<'a>(collection: &'a Collection, filter: &Document) -> Option<(&'a String, &'a Document)> {
    collection
        .iter()
        .find(|(_, doc)| matches_filter(doc, filter))
}

#[async_trait]
impl Store for MemoryStore {
    async fn find_one(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Option<Document>, StoreError> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .and_then(|docs| first_match(docs, filter))
            .map(|(_, doc)| doc.clone()))
    }

    async fn find(
        &self,
        collection: &str,
        filter: &Document,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.read()?;
        Ok(collections
            .get(collection)
            .map(|docs| {
                docs.values()
                    .filter(|doc| matches_filter(doc, filter))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn insert_one(
        &self,
        collection: &str,
        mut document: Document,
    ) -> Result<EntityId, StoreError> {
        let id = match document.get("_id") {
            Some(Value::String(raw)) => EntityId::from_str(raw)
                .map_err(|_| StoreError::backend(anyhow::anyhow!("malformed _id: {raw}")))?,
            Some(other) => {
                return Err(StoreError::backend(anyhow::anyhow!(
                    "malformed _id: {other}"
                )))
            }
            None => {
                let id = EntityId::generate();
                document.insert("_id".to_string(), Value::from(&id));
                id
            }
        };

        let mut collections = self.write()?;
        let docs = collections.entry(collection.to_string()).or_default();
        if docs.contains_key(id.as_str()) {
            return Err(StoreError::backend(anyhow::anyhow!(
                "duplicate key: {id}"
            )));
        }
        docs.insert(id.to_string(), document);
        Ok(id)
    }

    async fn update_one(
        &self,
        collection: &str,
        filter: &Document,
        patch: &Document,
    ) -> Result<u64, StoreError> {
        let mut collections = self.write()?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(id) = first_match(docs, filter).map(|(id, _)| id.clone()) else {
            return Ok(0);
        };
        if let Some(doc) = docs.get_mut(&id) {
            apply_patch(doc, patch);
        }
        Ok(1)
    }

    async fn delete_one(&self, collection: &str, filter: &Document) -> Result<u64, StoreError> {
        let mut collections = self.write()?;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let Some(id) = first_match(docs, filter).map(|(id, _)| id.clone()) else {
            return Ok(0);
        };
        docs.remove(&id);
        Ok(1)
    }
}

use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap};
use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{MetadataStore, ObjectStore};
use crate::{FragmentSet, FragmentSetId, NewFragmentSet, Result, StorageError};

/// In-process object store, used for tests and local experiments.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        match self.objects.write().await.entry(key.to_string()) {
            Entry::Occupied(_) => Err(StorageError::AlreadyExists(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(data.to_vec());
                Ok(())
            }
        }
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        self.objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects.read().await;
        Ok(objects
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects
            .write()
            .await
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::NotFound(key.to_string()))
    }
}

#[derive(Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<FragmentSetId, FragmentSet>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn create(&self, set: NewFragmentSet) -> Result<FragmentSetId> {
        let id = FragmentSetId::generate();
        self.records.write().await.insert(id, set.with_id(id));
        Ok(id)
    }

    async fn get_by_id(&self, id: &FragmentSetId) -> Result<Option<FragmentSet>> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<FragmentSet>> {
        let mut records: Vec<_> = self.records.read().await.values().cloned().collect();
        records.sort_by_key(|record| record.uploaded_at);
        Ok(records)
    }
}

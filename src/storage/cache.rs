use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Arc;
use async_trait::async_trait;
use tokio::sync::Mutex;

use super::MetadataStore;
use crate::{FragmentSet, FragmentSetId, NewFragmentSet, Result};

/// Read-through LRU cache in front of a metadata store.
///
/// Fragment sets are never updated after creation, so cached entries need no
/// invalidation.
pub struct CachedMetadataStore {
    inner: Arc<dyn MetadataStore>,
    cache: Mutex<LruCache<FragmentSetId, FragmentSet>>,
}

impl CachedMetadataStore {
    pub fn new(inner: Arc<dyn MetadataStore>, capacity: NonZeroUsize) -> Self {
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub async fn cached_len(&self) -> usize {
        self.cache.lock().await.len()
    }
}

#[async_trait]
impl MetadataStore for CachedMetadataStore {
    async fn create(&self, set: NewFragmentSet) -> Result<FragmentSetId> {
        let id = self.inner.create(set.clone()).await?;
        self.cache.lock().await.put(id, set.with_id(id));
        Ok(id)
    }

    async fn get_by_id(&self, id: &FragmentSetId) -> Result<Option<FragmentSet>> {
        if let Some(record) = self.cache.lock().await.get(id).cloned() {
            return Ok(Some(record));
        }

        let record = self.inner.get_by_id(id).await?;
        if let Some(record) = &record {
            self.cache.lock().await.put(*id, record.clone());
        }
        Ok(record)
    }

    async fn list(&self) -> Result<Vec<FragmentSet>> {
        self.inner.list().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryMetadataStore;
    use crate::{FragmentKey, Stamp};
    use chrono::Utc;

    fn new_set(name: &str) -> NewFragmentSet {
        NewFragmentSet {
            original_name: name.into(),
            uploaded_at: Utc::now(),
            fragment_keys: vec![FragmentKey::new(0, Stamp::new(1, 1))],
            fragment_checksums: Vec::new(),
            owner_id: "owner".into(),
        }
    }

    #[tokio::test]
    async fn created_records_are_served_from_cache() {
        let inner = Arc::new(MemoryMetadataStore::new());
        let cached = CachedMetadataStore::new(inner.clone(), NonZeroUsize::new(4).unwrap());

        let id = cached.create(new_set("a.txt")).await.unwrap();
        assert_eq!(cached.cached_len().await, 1);

        let record = cached.get_by_id(&id).await.unwrap().unwrap();
        assert_eq!(record, inner.get_by_id(&id).await.unwrap().unwrap());
    }

    #[tokio::test]
    async fn capacity_evicts_least_recently_used() {
        let inner = Arc::new(MemoryMetadataStore::new());
        let cached = CachedMetadataStore::new(inner, NonZeroUsize::new(2).unwrap());

        let first = cached.create(new_set("1")).await.unwrap();
        cached.create(new_set("2")).await.unwrap();
        cached.create(new_set("3")).await.unwrap();
        assert_eq!(cached.cached_len().await, 2);

        // evicted entries are still readable through the inner store
        let record = cached.get_by_id(&first).await.unwrap().unwrap();
        assert_eq!(record.original_name, "1");
    }

    #[tokio::test]
    async fn misses_are_not_cached() {
        let inner = Arc::new(MemoryMetadataStore::new());
        let cached = CachedMetadataStore::new(inner, NonZeroUsize::new(2).unwrap());

        assert!(cached.get_by_id(&FragmentSetId::generate()).await.unwrap().is_none());
        assert_eq!(cached.cached_len().await, 0);
    }
}

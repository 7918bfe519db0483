//! Object and metadata storage backends.
//!
//! The coordinator only ever calls `put`/`get` on an [`ObjectStore`] and
//! `create`/`get_by_id` on a [`MetadataStore`]. Listing and deletion exist for
//! maintenance tooling such as orphan collection.

pub mod cache;
pub mod disk;
pub mod maintenance;
pub mod memory;

use async_trait::async_trait;

use crate::{FragmentSet, FragmentSetId, NewFragmentSet, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()>;
    /// Fails with `StorageError::NotFound` for an unknown key.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
    async fn delete(&self, key: &str) -> Result<()>;
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Persists the record and returns the id assigned to it.
    async fn create(&self, set: NewFragmentSet) -> Result<FragmentSetId>;
    /// Returns `Ok(None)` when no record exists for `id`.
    async fn get_by_id(&self, id: &FragmentSetId) -> Result<Option<FragmentSet>>;
    /// All records, oldest upload first.
    async fn list(&self) -> Result<Vec<FragmentSet>>;
}

pub use cache::CachedMetadataStore;
pub use disk::{DiskMetadataStore, DiskObjectStore};
pub use memory::{MemoryMetadataStore, MemoryObjectStore};

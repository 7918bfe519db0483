//! In-process doubles for the coordinator's collaborators.
//!
//! Used by the integration tests of this crate and of the `server` crate.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use async_trait::async_trait;

use crate::codec::{Decoder, Encoder};
use crate::coordinator::{Coordinator, CoordinatorConfig};
use crate::storage::{MemoryMetadataStore, MemoryObjectStore, MetadataStore, ObjectStore};
use crate::{FragmentSet, FragmentSetId, NewFragmentSet, Result, ServiceError, StorageError};

/// Splits input into `stripes` contiguous pieces; decoding concatenates them.
///
/// Every stripe is needed to reconstruct the input, which is enough to
/// exercise ordering without a real dispersal scheme.
#[derive(Debug, Default)]
pub struct StripingCodec {
    stripes: usize,
    encode_calls: AtomicUsize,
    decode_calls: AtomicUsize,
}

impl StripingCodec {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: stripes.max(1),
            ..Self::default()
        }
    }

    pub fn encode_calls(&self) -> usize {
        self.encode_calls.load(Ordering::SeqCst)
    }

    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for StripingCodec {
    async fn encode(&self, data: &[u8]) -> std::result::Result<Vec<Vec<u8>>, ServiceError> {
        self.encode_calls.fetch_add(1, Ordering::SeqCst);
        let stripe_len = data.len().div_ceil(self.stripes).max(1);
        let mut fragments: Vec<Vec<u8>> = data.chunks(stripe_len).map(<[u8]>::to_vec).collect();
        fragments.resize(self.stripes, Vec::new());
        Ok(fragments)
    }
}

#[async_trait]
impl Decoder for StripingCodec {
    async fn decode(&self, fragments: &[Vec<u8>]) -> std::result::Result<Vec<u8>, ServiceError> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        Ok(fragments.concat())
    }
}

/// Codec whose encoder answers with a fixed fragment list and whose decoder
/// always fails.
#[derive(Debug, Default)]
pub struct FixedCodec {
    fragments: Vec<Vec<u8>>,
    decode_calls: AtomicUsize,
}

impl FixedCodec {
    pub fn new(fragments: Vec<Vec<u8>>) -> Self {
        Self {
            fragments,
            decode_calls: AtomicUsize::new(0),
        }
    }

    pub fn decode_calls(&self) -> usize {
        self.decode_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Encoder for FixedCodec {
    async fn encode(&self, _data: &[u8]) -> std::result::Result<Vec<Vec<u8>>, ServiceError> {
        Ok(self.fragments.clone())
    }
}

#[async_trait]
impl Decoder for FixedCodec {
    async fn decode(&self, _fragments: &[Vec<u8>]) -> std::result::Result<Vec<u8>, ServiceError> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::Api {
            status: 500,
            body: "decode failed".into(),
        })
    }
}

/// Codec that never answers, for exercising call timeouts.
#[derive(Debug, Default)]
pub struct StalledCodec;

#[async_trait]
impl Encoder for StalledCodec {
    async fn encode(&self, _data: &[u8]) -> std::result::Result<Vec<Vec<u8>>, ServiceError> {
        std::future::pending().await
    }
}

#[async_trait]
impl Decoder for StalledCodec {
    async fn decode(&self, _fragments: &[Vec<u8>]) -> std::result::Result<Vec<u8>, ServiceError> {
        std::future::pending().await
    }
}

/// Object store that fails puts or gets for keys containing a marker.
#[derive(Default)]
pub struct FaultyObjectStore {
    inner: MemoryObjectStore,
    failing_puts: Mutex<HashSet<String>>,
    failing_gets: Mutex<HashSet<String>>,
    stalled_gets: Mutex<HashSet<String>>,
}

impl FaultyObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails every put whose key contains `marker`, e.g. `"fragment_2_"`.
    pub fn fail_puts(&self, marker: &str) {
        lock(&self.failing_puts).insert(marker.to_string());
    }

    pub fn fail_gets(&self, marker: &str) {
        lock(&self.failing_gets).insert(marker.to_string());
    }

    /// Gets for matching keys never complete.
    pub fn stall_gets(&self, marker: &str) {
        lock(&self.stalled_gets).insert(marker.to_string());
    }

    pub fn inner(&self) -> &MemoryObjectStore {
        &self.inner
    }

    fn matches(set: &Mutex<HashSet<String>>, key: &str) -> bool {
        lock(set).iter().any(|marker| key.contains(marker.as_str()))
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[async_trait]
impl ObjectStore for FaultyObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        if Self::matches(&self.failing_puts, key) {
            return Err(StorageError::Storage(format!("injected put failure for {}", key)));
        }
        self.inner.put(key, data).await
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        if Self::matches(&self.stalled_gets, key) {
            std::future::pending::<()>().await;
        }
        if Self::matches(&self.failing_gets, key) {
            return Err(StorageError::Storage(format!("injected get failure for {}", key)));
        }
        self.inner.get(key).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        self.inner.list(prefix).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.delete(key).await
    }
}

/// Metadata store that fails either every write or every read.
#[derive(Default)]
pub struct FailingMetadataStore {
    inner: MemoryMetadataStore,
    fail_creates: bool,
    fail_reads: bool,
    create_calls: AtomicUsize,
}

impl FailingMetadataStore {
    /// Every create fails; reads see an empty store.
    pub fn failing_writes() -> Self {
        Self {
            fail_creates: true,
            ..Self::default()
        }
    }

    /// Creates land; every lookup and listing fails.
    pub fn failing_reads() -> Self {
        Self {
            fail_reads: true,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> &MemoryMetadataStore {
        &self.inner
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataStore for FailingMetadataStore {
    async fn create(&self, set: NewFragmentSet) -> Result<FragmentSetId> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_creates {
            return Err(StorageError::Storage("injected metadata write failure".into()));
        }
        self.inner.create(set).await
    }

    async fn get_by_id(&self, id: &FragmentSetId) -> Result<Option<FragmentSet>> {
        if self.fail_reads {
            return Err(StorageError::Storage("injected metadata read failure".into()));
        }
        self.inner.get_by_id(id).await
    }

    async fn list(&self) -> Result<Vec<FragmentSet>> {
        if self.fail_reads {
            return Err(StorageError::Storage("injected metadata read failure".into()));
        }
        self.inner.list().await
    }
}

/// A coordinator wired entirely to in-memory collaborators.
pub struct Harness {
    pub objects: Arc<FaultyObjectStore>,
    pub metadata: Arc<MemoryMetadataStore>,
    pub codec: Arc<StripingCodec>,
    pub coordinator: Arc<Coordinator>,
}

impl Harness {
    pub fn new(stripes: usize, config: CoordinatorConfig) -> Self {
        let objects = Arc::new(FaultyObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let codec = Arc::new(StripingCodec::new(stripes));
        let coordinator = Coordinator::new(
            objects.clone() as Arc<dyn ObjectStore>,
            metadata.clone() as Arc<dyn MetadataStore>,
            codec.clone(),
            codec.clone(),
            config,
        )
        .expect("valid test configuration");

        Self {
            objects,
            metadata,
            codec,
            coordinator: Arc::new(coordinator),
        }
    }
}

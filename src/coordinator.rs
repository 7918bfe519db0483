//! Sequencing of the ingest and retrieve workflows.
//!
//! Ingest: encode → store every fragment → record one fragment set.
//! Retrieve: look up the set → fetch what can be fetched → check the threshold
//! → decode → strip control characters.
//!
//! A fragment set is only recorded once every one of its fragments has been
//! confirmed by the object store. Fragments stored by an ingest that fails
//! later stay behind as orphans; see [`crate::storage::maintenance`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::{join_all, try_join_all};
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::codec::{Decoder, Encoder};
use crate::storage::{MetadataStore, ObjectStore};
use crate::types::checksum;
use crate::{
    CoordinatorError, FragmentKey, FragmentSet, FragmentSetId, KeyStamper, NewFragmentSet, Stage,
};

/// Minimum number of fragments the reference dispersal scheme needs (m = 3).
pub const DEFAULT_MIN_FRAGMENTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Fewest fetched fragments worth handing to the decoder.
    pub min_fragments: usize,
    /// Bound for each object or metadata store call.
    pub storage_timeout_seconds: u64,
    /// Bound for each encode or decode call.
    pub service_timeout_seconds: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            min_fragments: DEFAULT_MIN_FRAGMENTS,
            storage_timeout_seconds: 10,
            service_timeout_seconds: 30,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self) -> Result<(), CoordinatorError> {
        if self.min_fragments == 0 {
            return Err(CoordinatorError::Configuration(
                "min_fragments must be at least 1".into(),
            ));
        }
        if self.storage_timeout_seconds == 0 || self.service_timeout_seconds == 0 {
            return Err(CoordinatorError::Configuration(
                "timeouts must be at least one second".into(),
            ));
        }
        Ok(())
    }

    fn storage_timeout(&self) -> Duration {
        Duration::from_secs(self.storage_timeout_seconds)
    }

    fn service_timeout(&self) -> Duration {
        Duration::from_secs(self.service_timeout_seconds)
    }
}

/// Reconstructed content of a fragment set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RetrievedFile {
    pub id: FragmentSetId,
    pub original_name: String,
    /// Decoded bytes read as UTF-8, with invalid sequences replaced by U+FFFD
    /// and control characters removed. Binary uploads do not round-trip.
    pub content: String,
    pub fragments_used: usize,
    pub fragments_skipped: usize,
}

impl RetrievedFile {
    pub async fn write_to(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        tokio::fs::write(path, self.content.as_bytes()).await
    }
}

/// Removes ASCII control characters (`0x00`-`0x1F` and `0x7F`).
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(c, '\u{00}'..='\u{1F}' | '\u{7F}'))
        .collect()
}

pub struct Coordinator {
    objects: Arc<dyn ObjectStore>,
    metadata: Arc<dyn MetadataStore>,
    encoder: Arc<dyn Encoder>,
    decoder: Arc<dyn Decoder>,
    stamper: Arc<KeyStamper>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(
        objects: Arc<dyn ObjectStore>,
        metadata: Arc<dyn MetadataStore>,
        encoder: Arc<dyn Encoder>,
        decoder: Arc<dyn Decoder>,
        config: CoordinatorConfig,
    ) -> Result<Self, CoordinatorError> {
        config.validate()?;
        Ok(Self {
            objects,
            metadata,
            encoder,
            decoder,
            stamper: Arc::new(KeyStamper::new()),
            config,
        })
    }

    /// Shares a stamp source with other coordinators writing to the same bucket.
    pub fn with_stamper(mut self, stamper: Arc<KeyStamper>) -> Self {
        self.stamper = stamper;
        self
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn objects(&self) -> &Arc<dyn ObjectStore> {
        &self.objects
    }

    pub fn metadata(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata
    }

    pub async fn ingest(
        &self,
        data: &[u8],
        original_name: &str,
        owner_id: &str,
    ) -> Result<FragmentSetId, CoordinatorError> {
        self.ingest_record(data, original_name, owner_id)
            .await
            .map(|set| set.id)
    }

    /// Like [`Coordinator::ingest`], but returns the whole record as stored.
    pub async fn ingest_record(
        &self,
        data: &[u8],
        original_name: &str,
        owner_id: &str,
    ) -> Result<FragmentSet, CoordinatorError> {
        let span = info_span!("ingest", name = %original_name, owner = %owner_id, bytes = data.len());
        async {
            debug!("started");
            let result = self.run_ingest(data, original_name, owner_id).await;
            match &result {
                Ok(set) => info!(file_id = %set.id, fragments = set.fragments_count, "ingest completed"),
                Err(e) => warn!(stage = %e.stage(), kind = ?e.kind(), error = %e, "ingest failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_ingest(
        &self,
        data: &[u8],
        original_name: &str,
        owner_id: &str,
    ) -> Result<FragmentSet, CoordinatorError> {
        if data.is_empty() {
            return Err(CoordinatorError::EmptyInput);
        }

        debug!(stage = %Stage::Encode, "encoding");
        let fragments = bounded(self.config.service_timeout(), self.encoder.encode(data))
            .await
            .map_err(CoordinatorError::EncodingUnavailable)?;
        if fragments.is_empty() {
            return Err(CoordinatorError::EncodingUnavailable(
                "service returned no fragments".into(),
            ));
        }

        let stamp = self.stamper.next();
        let keys: Vec<FragmentKey> = (0..fragments.len())
            .map(|index| FragmentKey::new(index, stamp))
            .collect();

        debug!(stage = %Stage::Store, fragments = fragments.len(), "storing");
        try_join_all(
            keys.iter()
                .zip(&fragments)
                .map(|(key, fragment)| self.store_fragment(key, fragment)),
        )
        .await?;

        debug!(stage = %Stage::Record, "recording");
        let set = NewFragmentSet {
            original_name: original_name.to_string(),
            uploaded_at: Utc::now(),
            fragment_checksums: fragments.iter().map(|f| checksum(f)).collect(),
            fragment_keys: keys,
            owner_id: owner_id.to_string(),
        };
        let id = bounded(self.config.storage_timeout(), self.metadata.create(set.clone()))
            .await
            .map_err(CoordinatorError::MetadataWriteFailed)?;
        Ok(set.with_id(id))
    }

    async fn store_fragment(&self, key: &FragmentKey, data: &[u8]) -> Result<(), CoordinatorError> {
        bounded(self.config.storage_timeout(), self.objects.put(key.as_str(), data))
            .await
            .map_err(|reason| CoordinatorError::StorageWriteFailed {
                key: key.to_string(),
                reason,
            })
    }

    pub async fn retrieve(&self, id: &FragmentSetId) -> Result<RetrievedFile, CoordinatorError> {
        let span = info_span!("retrieve", file_id = %id);
        async {
            debug!("started");
            let result = self.run_retrieve(id).await;
            match &result {
                Ok(file) => info!(
                    used = file.fragments_used,
                    skipped = file.fragments_skipped,
                    "retrieve completed"
                ),
                Err(e) => warn!(stage = %e.stage(), kind = ?e.kind(), error = %e, "retrieve failed"),
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn run_retrieve(&self, id: &FragmentSetId) -> Result<RetrievedFile, CoordinatorError> {
        let set = self.describe(id).await?;

        debug!(stage = %Stage::Fetch, fragments = set.fragment_keys.len(), "fetching");
        let fetched = join_all(
            set.fragment_keys
                .iter()
                .enumerate()
                .map(|(index, key)| self.fetch_fragment(&set, index, key)),
        )
        .await;

        let total = fetched.len();
        let fragments: Vec<Vec<u8>> = fetched.into_iter().flatten().collect();
        let skipped = total - fragments.len();

        if fragments.len() < self.config.min_fragments {
            return Err(CoordinatorError::InsufficientFragments {
                available: fragments.len(),
                required: self.config.min_fragments,
                total,
            });
        }

        debug!(stage = %Stage::Decode, fragments = fragments.len(), "decoding");
        let recovered = bounded(self.config.service_timeout(), self.decoder.decode(&fragments))
            .await
            .map_err(CoordinatorError::DecodingFailed)?;

        Ok(RetrievedFile {
            id: set.id,
            original_name: set.original_name,
            content: sanitize(&String::from_utf8_lossy(&recovered)),
            fragments_used: fragments.len(),
            fragments_skipped: skipped,
        })
    }

    /// Fetches one fragment, turning any failure into a skip.
    async fn fetch_fragment(&self, set: &FragmentSet, index: usize, key: &FragmentKey) -> Option<Vec<u8>> {
        let data = match bounded(self.config.storage_timeout(), self.objects.get(key.as_str())).await {
            Ok(data) => data,
            Err(reason) => {
                warn!(key = %key, %reason, "skipping unavailable fragment");
                return None;
            }
        };

        if let Some(expected) = set.checksum_of(index) {
            if checksum(&data) != expected {
                warn!(key = %key, "skipping fragment with mismatched checksum");
                return None;
            }
        }
        Some(data)
    }

    /// Loads a fragment set without touching its fragments.
    pub async fn describe(&self, id: &FragmentSetId) -> Result<FragmentSet, CoordinatorError> {
        bounded(self.config.storage_timeout(), self.metadata.get_by_id(id))
            .await
            .map_err(|reason| CoordinatorError::MetadataReadFailed {
                id: id.to_string(),
                reason,
            })?
            .ok_or_else(|| CoordinatorError::NotFound(id.to_string()))
    }

    pub async fn list(&self) -> Result<Vec<FragmentSet>, CoordinatorError> {
        bounded(self.config.storage_timeout(), self.metadata.list())
            .await
            .map_err(|reason| CoordinatorError::MetadataReadFailed {
                id: "*".into(),
                reason,
            })
    }
}

/// Runs `call` with an upper time bound, flattening both failure modes to a reason.
async fn bounded<T, E, F>(limit: Duration, call: F) -> Result<T, String>
where
    F: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    match timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err(format!("timed out after {}s", limit.as_secs())),
    }
}

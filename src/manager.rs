use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::codec::HttpCodecClient;
use crate::config::Config;
use crate::coordinator::{Coordinator, RetrievedFile};
use crate::storage::maintenance::{collect_orphans, OrphanReport};
use crate::storage::{CachedMetadataStore, DiskMetadataStore, DiskObjectStore, MetadataStore, ObjectStore};
use crate::{CoordinatorError, FragmentSet, FragmentSetId};

/// Disk-backed coordinator wired to the HTTP codec service, as the binaries run it.
#[derive(Clone)]
pub struct StorageManager {
    coordinator: Arc<Coordinator>,
    orphan_grace: Duration,
}

impl StorageManager {
    pub async fn open(config: &Config) -> Result<Self, CoordinatorError> {
        config.validate()?;
        let root = &config.storage.root;

        let objects = DiskObjectStore::new(root.join("objects"))
            .await
            .map_err(|e| CoordinatorError::Configuration(format!("object store: {}", e)))?;
        let disk_metadata = DiskMetadataStore::new(root.join("metadata"))
            .await
            .map_err(|e| CoordinatorError::Configuration(format!("metadata store: {}", e)))?;
        let capacity = NonZeroUsize::new(config.storage.cache_capacity).ok_or_else(|| {
            CoordinatorError::Configuration("storage.cache_capacity must be at least 1".into())
        })?;
        let metadata = CachedMetadataStore::new(Arc::new(disk_metadata), capacity);

        let codec = Arc::new(
            HttpCodecClient::new(config.codec.clone())
                .map_err(|e| CoordinatorError::Configuration(e.to_string()))?,
        );

        let coordinator = Coordinator::new(
            Arc::new(objects),
            Arc::new(metadata),
            codec.clone(),
            codec,
            config.coordinator.clone(),
        )?;

        info!(root = %root.display(), encode_url = %config.codec.encode_url, "storage manager ready");
        Ok(Self::from_coordinator(
            Arc::new(coordinator),
            Duration::from_secs(config.maintenance.orphan_grace_seconds),
        ))
    }

    pub fn from_coordinator(coordinator: Arc<Coordinator>, orphan_grace: Duration) -> Self {
        Self {
            coordinator,
            orphan_grace,
        }
    }

    pub fn coordinator(&self) -> &Arc<Coordinator> {
        &self.coordinator
    }

    pub async fn upload_file(
        &self,
        filename: &str,
        data: &[u8],
        owner_id: &str,
    ) -> Result<FragmentSet, CoordinatorError> {
        self.coordinator.ingest_record(data, filename, owner_id).await
    }

    pub async fn download_file(&self, file_id: &FragmentSetId) -> Result<RetrievedFile, CoordinatorError> {
        self.coordinator.retrieve(file_id).await
    }

    pub async fn file_info(&self, file_id: &FragmentSetId) -> Result<FragmentSet, CoordinatorError> {
        self.coordinator.describe(file_id).await
    }

    pub async fn list_files(&self) -> Result<Vec<FragmentSet>, CoordinatorError> {
        self.coordinator.list().await
    }

    pub async fn collect_orphans(&self, dry_run: bool) -> Result<OrphanReport, CoordinatorError> {
        let objects: &dyn ObjectStore = self.coordinator.objects().as_ref();
        let metadata: &dyn MetadataStore = self.coordinator.metadata().as_ref();
        collect_orphans(objects, metadata, self.orphan_grace, dry_run)
            .await
            .map_err(|e| CoordinatorError::MaintenanceFailed(e.to_string()))
    }
}

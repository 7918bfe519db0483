use std::path::{Component, Path, PathBuf};
use tokio::fs;
use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use super::{MetadataStore, ObjectStore};
use crate::{FragmentSet, FragmentSetId, NewFragmentSet, Result, StorageError};

/// Object store keeping one file per key below a root directory.
pub struct DiskObjectStore {
    base_path: PathBuf,
}

impl DiskObjectStore {
    pub async fn new<P: AsRef<Path>>(base_path: P) -> Result<Self> {
        let base_path = base_path.as_ref().to_owned();
        fs::create_dir_all(&base_path).await?;
        Ok(Self { base_path })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        let relative = Path::new(key);
        let is_plain = !key.is_empty()
            && relative
                .components()
                .all(|component| matches!(component, Component::Normal(_)));
        if !is_plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.base_path.join(relative))
    }

    async fn collect_keys(&self, dir: PathBuf, keys: &mut Vec<String>) -> Result<()> {
        let mut pending = vec![dir];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().is_some_and(|ext| ext == "tmp") {
                    continue;
                }
                if let Ok(relative) = path.strip_prefix(&self.base_path) {
                    let key: Vec<_> = relative
                        .components()
                        .map(|c| c.as_os_str().to_string_lossy().into_owned())
                        .collect();
                    keys.push(key.join("/"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for DiskObjectStore {
    async fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        write_new(&path, data).await.map_err(|e| match e {
            StorageError::Io(io) if io.kind() == std::io::ErrorKind::AlreadyExists => {
                StorageError::AlreadyExists(key.to_string())
            }
            other => other,
        })?;
        debug!(key, bytes = data.len(), "stored object");
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        self.collect_keys(self.base_path.clone(), &mut keys).await?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.object_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(key.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

/// Metadata store writing one JSON document per fragment set.
pub struct DiskMetadataStore {
    metadata_path: PathBuf,
}

impl DiskMetadataStore {
    pub async fn new<P: AsRef<Path>>(metadata_path: P) -> Result<Self> {
        let metadata_path = metadata_path.as_ref().to_owned();
        fs::create_dir_all(&metadata_path).await?;
        Ok(Self { metadata_path })
    }

    fn get_metadata_path(&self, id: &FragmentSetId) -> PathBuf {
        self.metadata_path.join(format!("{}.json", id))
    }
}

#[async_trait]
impl MetadataStore for DiskMetadataStore {
    async fn create(&self, set: NewFragmentSet) -> Result<FragmentSetId> {
        let id = FragmentSetId::generate();
        let record = set.with_id(id);
        let metadata_json = serde_json::to_vec_pretty(&record)?;
        write_atomically(&self.get_metadata_path(&id), &metadata_json).await?;
        Ok(id)
    }

    async fn get_by_id(&self, id: &FragmentSetId) -> Result<Option<FragmentSet>> {
        let metadata_content = match fs::read(self.get_metadata_path(id)).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let record: FragmentSet = serde_json::from_slice(&metadata_content)?;
        Ok(Some(record))
    }

    async fn list(&self) -> Result<Vec<FragmentSet>> {
        let mut records = Vec::new();

        let mut entries = fs::read_dir(&self.metadata_path).await?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                if let Some(ext) = entry.path().extension() {
                    if ext == "json" {
                        let metadata_content = fs::read(entry.path()).await?;
                        let record: FragmentSet = serde_json::from_slice(&metadata_content)
                            .map_err(|e| StorageError::Storage(format!("Failed to parse metadata {}: {}", entry.path().display(), e)))?;
                        records.push(record);
                    }
                }
            }
        }

        records.sort_by_key(|record| record.uploaded_at);
        Ok(records)
    }
}

/// Writes to a sibling temp file first so readers never observe a partial object.
async fn write_atomically(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data).await?;
    fs::rename(&tmp, path).await?;
    Ok(())
}

/// Publishes `data` at `path` only if nothing is there yet.
///
/// The bytes go to a uniquely named temp file which is then hard-linked into
/// place; linking fails with `AlreadyExists` instead of replacing a blob.
async fn write_new(path: &Path, data: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(format!(".{}.tmp", Uuid::new_v4().simple()));
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, data).await?;
    let linked = fs::hard_link(&tmp, path).await;
    fs::remove_file(&tmp).await?;
    linked?;
    Ok(())
}

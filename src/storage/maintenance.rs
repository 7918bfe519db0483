//! Garbage collection of fragment blobs that no fragment set references.
//!
//! An ingest that fails after storing some fragments leaves those blobs
//! behind. Collection runs separately from the ingest path and only removes
//! blobs whose embedded stamp is older than a grace period, so fragments of an
//! ingest that is still recording its metadata are left alone.

use std::collections::HashSet;
use std::time::Duration;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};

use super::{MetadataStore, ObjectStore};
use crate::{FragmentKey, Result, FRAGMENT_PREFIX};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OrphanReport {
    pub scanned: usize,
    pub referenced: usize,
    /// Unreferenced keys that were deleted (or would be, on a dry run).
    pub orphaned: Vec<String>,
    /// Unreferenced keys still inside the grace period.
    pub retained: Vec<String>,
    pub failed: Vec<String>,
}

pub async fn collect_orphans(
    objects: &dyn ObjectStore,
    metadata: &dyn MetadataStore,
    grace: Duration,
    dry_run: bool,
) -> Result<OrphanReport> {
    let stored = objects.list(FRAGMENT_PREFIX).await?;

    let referenced: HashSet<String> = metadata
        .list()
        .await?
        .into_iter()
        .flat_map(|set| set.fragment_keys.into_iter().map(|key| key.0))
        .collect();

    let now_ms = Utc::now().timestamp_millis().max(0) as u64;
    let grace_ms = grace.as_millis() as u64;

    let mut report = OrphanReport {
        scanned: stored.len(),
        ..OrphanReport::default()
    };

    for key in stored {
        if referenced.contains(&key) {
            report.referenced += 1;
            continue;
        }

        // keys without a parseable stamp were not written by an ingest; treat them as old
        let stamp = FragmentKey(key.clone()).parse().map(|(_, stamp)| stamp).unwrap_or(0);
        if now_ms.saturating_sub(stamp) < grace_ms {
            report.retained.push(key);
            continue;
        }

        if !dry_run {
            if let Err(e) = objects.delete(&key).await {
                warn!(key = %key, error = %e, "failed to delete orphaned fragment");
                report.failed.push(key);
                continue;
            }
        }
        report.orphaned.push(key);
    }

    info!(
        scanned = report.scanned,
        orphaned = report.orphaned.len(),
        retained = report.retained.len(),
        dry_run,
        "orphan collection finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryMetadataStore, MemoryObjectStore};
    use crate::{NewFragmentSet, Stamp};

    async fn seed() -> (MemoryObjectStore, MemoryMetadataStore, String, String, String) {
        let objects = MemoryObjectStore::new();
        let metadata = MemoryMetadataStore::new();

        let referenced = FragmentKey::new(0, Stamp::new(1_000, 1));
        let stale = FragmentKey::new(1, Stamp::new(2_000, 1));
        let fresh = FragmentKey::new(0, Stamp::new(Utc::now().timestamp_millis() as u64, 1));
        for key in [&referenced, &stale, &fresh] {
            objects.put(key.as_str(), b"blob").await.unwrap();
        }
        metadata
            .create(NewFragmentSet {
                original_name: "kept.txt".into(),
                uploaded_at: Utc::now(),
                fragment_keys: vec![referenced.clone()],
                fragment_checksums: Vec::new(),
                owner_id: "owner".into(),
            })
            .await
            .unwrap();

        (objects, metadata, referenced.0, stale.0, fresh.0)
    }

    #[tokio::test]
    async fn deletes_only_stale_unreferenced_fragments() {
        let (objects, metadata, referenced, stale, fresh) = seed().await;

        let report = collect_orphans(&objects, &metadata, Duration::from_secs(3600), false)
            .await
            .unwrap();

        assert_eq!(report.scanned, 3);
        assert_eq!(report.referenced, 1);
        assert_eq!(report.orphaned, vec![stale.clone()]);
        assert_eq!(report.retained, vec![fresh.clone()]);

        assert!(objects.get(&referenced).await.is_ok());
        assert!(objects.get(&fresh).await.is_ok());
        assert!(objects.get(&stale).await.is_err());
    }

    #[tokio::test]
    async fn dry_run_reports_without_deleting() {
        let (objects, metadata, _, stale, _) = seed().await;

        let report = collect_orphans(&objects, &metadata, Duration::from_secs(3600), true)
            .await
            .unwrap();

        assert_eq!(report.orphaned, vec![stale.clone()]);
        assert!(objects.get(&stale).await.is_ok());
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;
    use std::time::Duration;

    use fragment_store::storage::maintenance::collect_orphans;
    use fragment_store::storage::{MemoryMetadataStore, MetadataStore, ObjectStore};
    use fragment_store::testing::{
        FailingMetadataStore, FaultyObjectStore, FixedCodec, Harness, StalledCodec, StripingCodec,
    };
    use fragment_store::*;
    use futures::future::join_all;
    use proptest::prelude::*;

    fn config(min_fragments: usize) -> CoordinatorConfig {
        CoordinatorConfig {
            min_fragments,
            storage_timeout_seconds: 1,
            service_timeout_seconds: 1,
        }
    }

    fn coordinator_with(
        objects: Arc<FaultyObjectStore>,
        metadata: Arc<MemoryMetadataStore>,
        encoder: Arc<dyn codec::Encoder>,
        decoder: Arc<dyn codec::Decoder>,
        min_fragments: usize,
    ) -> Coordinator {
        Coordinator::new(objects, metadata, encoder, decoder, config(min_fragments))
            .expect("valid configuration")
    }

    /// Ten bytes, four fragments, all stored, all fetched, decoded back.
    #[tokio::test]
    async fn ten_byte_file_round_trips_through_four_fragments() {
        let harness = Harness::new(4, config(3));

        let id = harness
            .coordinator
            .ingest(b"0123456789", "digits.txt", "owner-1")
            .await
            .expect("ingest succeeds");

        let record = harness.metadata.get_by_id(&id).await.unwrap().expect("recorded");
        assert_eq!(record.original_name, "digits.txt");
        assert_eq!(record.owner_id, "owner-1");
        assert_eq!(record.fragments_count, 4);
        assert_eq!(record.fragment_checksums.len(), 4);

        let parsed: Vec<_> = record.fragment_keys.iter().map(|k| k.parse().unwrap()).collect();
        let stamp = parsed[0].1;
        assert_eq!(parsed, vec![(0, stamp), (1, stamp), (2, stamp), (3, stamp)]);

        let retrieved = harness.coordinator.retrieve(&id).await.expect("retrieve succeeds");
        assert_eq!(retrieved.content, "0123456789");
        assert_eq!(retrieved.original_name, "digits.txt");
        assert_eq!(retrieved.fragments_used, 4);
        assert_eq!(retrieved.fragments_skipped, 0);
        assert_eq!(harness.codec.decode_calls(), 1);
    }

    #[tokio::test]
    async fn retrieved_content_is_stripped_of_control_characters() {
        let harness = Harness::new(3, config(3));

        let id = harness
            .coordinator
            .ingest(b"line one\nline two\t\x07done\x7f", "log.txt", "owner")
            .await
            .unwrap();

        let retrieved = harness.coordinator.retrieve(&id).await.unwrap();
        assert_eq!(retrieved.content, "line oneline twodone");
    }

    #[tokio::test]
    async fn empty_input_is_rejected_before_encoding() {
        let harness = Harness::new(4, config(3));

        let err = harness.coordinator.ingest(b"", "empty", "owner").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        assert_eq!(harness.codec.encode_calls(), 0);
        assert!(harness.metadata.is_empty().await);
    }

    #[tokio::test]
    async fn zero_fragments_is_encoding_unavailable_and_records_nothing() {
        let objects = Arc::new(FaultyObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let codec = Arc::new(FixedCodec::new(Vec::new()));
        let coordinator = coordinator_with(objects.clone(), metadata.clone(), codec.clone(), codec, 3);

        let err = coordinator.ingest(b"data", "a.txt", "owner").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EncodingUnavailable);
        assert_eq!(err.stage(), Stage::Encode);
        assert!(metadata.is_empty().await);
        assert!(objects.inner().is_empty().await);
    }

    #[tokio::test]
    async fn stalled_encoder_times_out() {
        let objects = Arc::new(FaultyObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let codec = Arc::new(StalledCodec);
        let coordinator = coordinator_with(objects, metadata.clone(), codec.clone(), codec, 3);

        let err = coordinator.ingest(b"data", "a.txt", "owner").await.unwrap_err();

        assert!(matches!(&err, CoordinatorError::EncodingUnavailable(reason) if reason.contains("timed out")));
        assert!(metadata.is_empty().await);
    }

    #[tokio::test]
    async fn failed_fragment_store_aborts_without_metadata() {
        let harness = Harness::new(4, config(3));
        harness.objects.fail_puts("fragment_2_");

        let err = harness
            .coordinator
            .ingest(b"0123456789", "digits.txt", "owner")
            .await
            .unwrap_err();

        match &err {
            CoordinatorError::StorageWriteFailed { key, .. } => {
                assert!(key.starts_with("fragments/fragment_2_"), "key {}", key)
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(err.stage(), Stage::Store);
        assert!(harness.metadata.is_empty().await);
        assert!(harness.coordinator.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_id_is_not_found() {
        let harness = Harness::new(4, config(3));

        let err = harness
            .coordinator
            .retrieve(&FragmentSetId::generate())
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(harness.codec.decode_calls(), 0);
    }

    #[tokio::test]
    async fn too_few_fragments_skips_decoding() {
        let harness = Harness::new(4, config(3));
        let id = harness
            .coordinator
            .ingest(b"0123456789", "digits.txt", "owner")
            .await
            .unwrap();
        harness.objects.fail_gets("fragment_0_");
        harness.objects.fail_gets("fragment_3_");

        let err = harness.coordinator.retrieve(&id).await.unwrap_err();

        match err {
            CoordinatorError::InsufficientFragments { available, required, total } => {
                assert_eq!((available, required, total), (2, 3, 4));
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(harness.codec.decode_calls(), 0);
    }

    #[tokio::test]
    async fn missing_fragment_is_skipped_when_threshold_is_met() {
        let objects = Arc::new(FaultyObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let codec = Arc::new(FixedCodec::new(vec![vec![1], vec![2], vec![3], vec![4]]));
        let coordinator =
            coordinator_with(objects.clone(), metadata, codec.clone(), codec.clone(), 3);

        let id = coordinator.ingest(b"data", "a.bin", "owner").await.unwrap();
        let set = coordinator.describe(&id).await.unwrap();
        objects.inner().delete(set.fragment_keys[1].as_str()).await.unwrap();

        // three fragments remain, so the decoder is consulted and its failure surfaces
        let err = coordinator.retrieve(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DecodingFailed);
        assert_eq!(codec.decode_calls(), 1);
    }

    #[tokio::test]
    async fn corrupted_fragment_counts_as_unavailable() {
        let harness = Harness::new(4, config(4));
        let id = harness
            .coordinator
            .ingest(b"0123456789", "digits.txt", "owner")
            .await
            .unwrap();
        let set = harness.coordinator.describe(&id).await.unwrap();
        let key = set.fragment_keys[2].as_str();
        harness.objects.delete(key).await.unwrap();
        harness.objects.put(key, b"tampered").await.unwrap();

        let err = harness.coordinator.retrieve(&id).await.unwrap_err();
        assert!(matches!(
            err,
            CoordinatorError::InsufficientFragments { available: 3, required: 4, total: 4 }
        ));
    }

    #[tokio::test]
    async fn stalled_fetch_is_treated_as_failed_fragment() {
        let harness = Harness::new(4, config(4));
        let id = harness
            .coordinator
            .ingest(b"0123456789", "digits.txt", "owner")
            .await
            .unwrap();
        harness.objects.stall_gets("fragment_1_");

        let err = harness.coordinator.retrieve(&id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFragments);
        assert_eq!(harness.codec.decode_calls(), 0);
    }

    #[tokio::test]
    async fn concurrent_ingests_never_share_keys() {
        let harness = Harness::new(4, config(3));

        let ids = join_all((0..16).map(|i| {
            let coordinator = Arc::clone(&harness.coordinator);
            async move {
                let content = format!("payload number {}", i);
                coordinator.ingest(content.as_bytes(), "same-name.txt", "owner").await
            }
        }))
        .await;

        let mut keys = HashSet::new();
        for id in ids {
            let set = harness.coordinator.describe(&id.unwrap()).await.unwrap();
            for key in set.fragment_keys {
                assert!(keys.insert(key.clone()), "duplicate key {}", key);
            }
        }
        assert_eq!(keys.len(), 16 * 4);
        assert_eq!(harness.objects.inner().len().await, 16 * 4);
    }

    #[tokio::test]
    async fn coordinators_sharing_a_bucket_keep_files_apart() {
        let objects = Arc::new(FaultyObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let codec = Arc::new(StripingCodec::new(4));
        let first = coordinator_with(objects.clone(), metadata.clone(), codec.clone(), codec.clone(), 4);
        let second = coordinator_with(objects.clone(), metadata.clone(), codec.clone(), codec, 4);

        for _ in 0..20 {
            let a = first.ingest(b"AAAAAAAAAAAA", "a.txt", "owner").await.unwrap();
            let b = second.ingest(b"BBBBBBBBBBBB", "b.txt", "owner").await.unwrap();

            let keys_a = first.describe(&a).await.unwrap().fragment_keys;
            let keys_b = second.describe(&b).await.unwrap().fragment_keys;
            assert!(keys_a.iter().all(|key| !keys_b.contains(key)));

            assert_eq!(first.retrieve(&a).await.unwrap().content, "AAAAAAAAAAAA");
            assert_eq!(second.retrieve(&b).await.unwrap().content, "BBBBBBBBBBBB");
        }
        assert_eq!(objects.inner().len().await, 20 * 2 * 4);
    }

    #[tokio::test]
    async fn failed_record_leaves_fragments_as_orphans() {
        let objects = Arc::new(FaultyObjectStore::new());
        let metadata = Arc::new(FailingMetadataStore::failing_writes());
        let codec = Arc::new(StripingCodec::new(4));
        let coordinator = Coordinator::new(
            objects.clone(),
            metadata.clone(),
            codec.clone(),
            codec,
            config(3),
        )
        .expect("valid configuration");

        let err = coordinator.ingest(b"0123456789", "digits.txt", "owner").await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::MetadataWriteFailed);
        assert_eq!(err.stage(), Stage::Record);
        assert_eq!(metadata.create_calls(), 1);
        assert_eq!(objects.inner().len().await, 4);

        let report = collect_orphans(&*objects, &*metadata, Duration::ZERO, true)
            .await
            .unwrap();
        assert_eq!(report.orphaned.len(), 4);
        assert_eq!(report.referenced, 0);
    }

    #[tokio::test]
    async fn stalled_decoder_times_out() {
        let objects = Arc::new(FaultyObjectStore::new());
        let metadata = Arc::new(MemoryMetadataStore::new());
        let coordinator = coordinator_with(
            objects,
            metadata,
            Arc::new(StripingCodec::new(4)),
            Arc::new(StalledCodec),
            3,
        );
        let id = coordinator.ingest(b"0123456789", "digits.txt", "owner").await.unwrap();

        let err = coordinator.retrieve(&id).await.unwrap_err();

        assert!(matches!(&err, CoordinatorError::DecodingFailed(reason) if reason.contains("timed out")));
        assert_eq!(err.stage(), Stage::Decode);
    }

    #[tokio::test]
    async fn concurrent_retrieves_of_one_set_agree() {
        let harness = Harness::new(5, config(5));
        let id = harness
            .coordinator
            .ingest(b"shared content", "shared.txt", "owner")
            .await
            .unwrap();

        let results = join_all((0..8).map(|_| harness.coordinator.retrieve(&id))).await;
        for result in results {
            assert_eq!(result.unwrap().content, "shared content");
        }
    }

    #[tokio::test]
    async fn list_returns_every_recorded_set() {
        let harness = Harness::new(2, config(2));
        harness.coordinator.ingest(b"one", "one.txt", "a").await.unwrap();
        harness.coordinator.ingest(b"two", "two.txt", "b").await.unwrap();

        let names: HashSet<_> = harness
            .coordinator
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|set| set.original_name)
            .collect();
        assert_eq!(names, HashSet::from(["one.txt".to_string(), "two.txt".to_string()]));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn retrieve_returns_sanitized_ingested_bytes(
            data in proptest::collection::vec(any::<u8>(), 1..512),
            stripes in 1usize..8,
        ) {
            let runtime = tokio::runtime::Runtime::new().unwrap();
            let content = runtime.block_on(async {
                let harness = Harness::new(stripes, config(stripes));
                let id = harness.coordinator.ingest(&data, "prop.bin", "owner").await.unwrap();
                harness.coordinator.retrieve(&id).await.unwrap().content
            });
            prop_assert_eq!(content, sanitize(&String::from_utf8_lossy(&data)));
        }
    }
}

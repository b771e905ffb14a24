// Property-based tests for whole-pipeline wipe behavior over MockStorage.
//
// Each property generates a bucket with a random mix of unlocked versions,
// legal holds, GOVERNANCE retentions, COMPLIANCE retentions and delete
// markers, runs a full `WipePipeline` against it and checks the resulting
// bucket state and recorded requests.

#[cfg(test)]
mod tests {
    use aws_sdk_s3::types::ObjectLockRetentionMode;
    use proptest::prelude::*;

    use crate::config::Config;
    use crate::export::read_export;
    use crate::test_utils::{
        MockCall, MockStorage, make_delete_marker, make_mock_pipeline, make_retention,
        make_test_config, make_versioned_s3_object,
    };
    use crate::types::S3Object;
    use crate::types::token::create_pipeline_cancellation_token;

    const HOUR: i64 = 3600;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Lock {
        None,
        LegalHold,
        Governance,
        LegalHoldAndGovernance,
        Compliance,
        DeleteMarker,
    }

    fn lock_strategy() -> impl Strategy<Value = Lock> {
        prop_oneof![
            Just(Lock::None),
            Just(Lock::LegalHold),
            Just(Lock::Governance),
            Just(Lock::LegalHoldAndGovernance),
            Just(Lock::Compliance),
            Just(Lock::DeleteMarker),
        ]
    }

    /// Build a mock bucket with one version per entry of `locks`.
    fn make_bucket(locks: &[Lock]) -> MockStorage {
        let versions: Vec<S3Object> = locks
            .iter()
            .enumerate()
            .map(|(i, lock)| {
                let key = format!("dir/key{i:03}");
                if *lock == Lock::DeleteMarker {
                    make_delete_marker(&key, "dm")
                } else {
                    make_versioned_s3_object(&key, "v1")
                }
            })
            .collect();

        let mut mock = MockStorage::new(versions);
        for (i, lock) in locks.iter().enumerate() {
            let key = format!("dir/key{i:03}");
            mock = match lock {
                Lock::LegalHold => mock.with_legal_hold(&key, "v1"),
                Lock::Governance => mock.with_retention(
                    &key,
                    "v1",
                    make_retention(ObjectLockRetentionMode::Governance, HOUR),
                ),
                Lock::LegalHoldAndGovernance => mock.with_legal_hold(&key, "v1").with_retention(
                    &key,
                    "v1",
                    make_retention(ObjectLockRetentionMode::Governance, HOUR),
                ),
                Lock::Compliance => mock.with_retention(
                    &key,
                    "v1",
                    make_retention(ObjectLockRetentionMode::Compliance, HOUR),
                ),
                Lock::None | Lock::DeleteMarker => mock,
            };
        }
        mock
    }

    fn run_pipeline(config: Config, mock: &MockStorage) -> crate::pipeline::WipePipeline {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async {
            let mut pipeline =
                make_mock_pipeline(config, create_pipeline_cancellation_token(), mock);
            pipeline.run().await;
            pipeline
        })
    }

    fn compliance_count(locks: &[Lock]) -> usize {
        locks.iter().filter(|lock| **lock == Lock::Compliance).count()
    }

    // -----------------------------------------------------------------------
    // Idempotence
    //
    // A second run over the result of a first run issues no mutating request:
    // every deletable version is gone and the only survivors are COMPLIANCE
    // versions, which are never touched.
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_second_run_is_a_no_op(
            locks in prop::collection::vec(lock_strategy(), 0..40),
        ) {
            let mock = make_bucket(&locks);

            let first_config = make_test_config();
            let first_export = first_config.export_file.clone();
            let first = run_pipeline(first_config, &mock);
            prop_assert!(!first.has_error());
            let mutations_after_first = mock.mutation_count();

            let second_config = make_test_config();
            let second_export = second_config.export_file.clone();
            let second = run_pipeline(second_config, &mock);
            prop_assert!(!second.has_error());
            prop_assert!(!second.has_failure());
            prop_assert_eq!(mock.mutation_count(), mutations_after_first);
            prop_assert_eq!(
                mock.remaining_versions().len(),
                compliance_count(&locks)
            );

            let _ = std::fs::remove_file(first_export);
            let _ = std::fs::remove_file(second_export);
        }
    }

    // -----------------------------------------------------------------------
    // COMPLIANCE safety
    //
    // A version under unexpired COMPLIANCE retention is never sent a retention
    // change or a delete, and it survives the run.
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_compliance_versions_are_never_mutated(
            locks in prop::collection::vec(lock_strategy(), 1..40),
        ) {
            let mock = make_bucket(&locks);
            let config = make_test_config();
            let export_file = config.export_file.clone();

            let pipeline = run_pipeline(config, &mock);

            let compliance_keys: Vec<String> = locks
                .iter()
                .enumerate()
                .filter(|(_, lock)| **lock == Lock::Compliance)
                .map(|(i, _)| format!("dir/key{i:03}"))
                .collect();

            for call in mock.calls() {
                match call {
                    MockCall::ClearObjectRetention { key, .. }
                    | MockCall::DeleteObject { key, .. } => {
                        prop_assert!(!compliance_keys.contains(&key));
                    }
                    _ => {}
                }
            }
            for key in &compliance_keys {
                prop_assert!(mock.retention(key, "v1").is_some());
            }

            let summary = pipeline.get_summary();
            prop_assert_eq!(summary.skipped as usize, compliance_keys.len());
            prop_assert_eq!(pipeline.has_warning(), !compliance_keys.is_empty());
            prop_assert!(!pipeline.has_failure());

            let _ = std::fs::remove_file(export_file);
        }
    }

    // -----------------------------------------------------------------------
    // Dry-run purity
    //
    // With dry_run the pipeline only lists: no lock query and no mutation,
    // and every version is reported as simulated.
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_dry_run_issues_no_mutation(
            locks in prop::collection::vec(lock_strategy(), 0..40),
            only_unlock in any::<bool>(),
        ) {
            let mock = make_bucket(&locks);
            let mut config = make_test_config();
            config.dry_run = true;
            config.only_unlock = only_unlock;
            let export_file = config.export_file.clone();

            let pipeline = run_pipeline(config, &mock);

            prop_assert_eq!(mock.mutation_count(), 0);
            prop_assert!(mock.calls().iter().all(|call| matches!(
                call,
                MockCall::ListObjectVersions | MockCall::GetObjectLockConfiguration
            )));
            prop_assert_eq!(pipeline.get_summary().simulated as usize, locks.len());
            prop_assert_eq!(mock.remaining_versions().len(), locks.len());

            let _ = std::fs::remove_file(export_file);
        }
    }

    // -----------------------------------------------------------------------
    // Only-unlock containment
    //
    // With only_unlock no DeleteObject is ever issued, yet every removable
    // lock is gone afterwards.
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_only_unlock_never_deletes(
            locks in prop::collection::vec(lock_strategy(), 0..40),
        ) {
            let mock = make_bucket(&locks);
            let mut config = make_test_config();
            config.only_unlock = true;
            let export_file = config.export_file.clone();

            let pipeline = run_pipeline(config, &mock);

            prop_assert_eq!(mock.delete_calls(), 0);
            prop_assert_eq!(mock.remaining_versions().len(), locks.len());

            for (i, lock) in locks.iter().enumerate() {
                let key = format!("dir/key{i:03}");
                if matches!(lock, Lock::Governance | Lock::LegalHoldAndGovernance) {
                    prop_assert!(mock.retention(&key, "v1").is_none());
                }
                prop_assert_ne!(
                    mock.legal_hold(&key, "v1"),
                    Some(aws_sdk_s3::types::ObjectLockLegalHoldStatus::On)
                );
            }

            let summary = pipeline.get_summary();
            prop_assert_eq!(
                summary.unlocked as usize,
                locks.len() - compliance_count(&locks)
            );

            let _ = std::fs::remove_file(export_file);
        }
    }

    // -----------------------------------------------------------------------
    // Completeness
    //
    // A bucket without COMPLIANCE versions ends empty, every version is
    // counted as deleted, and the export holds exactly one row per version.
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_every_version_is_deleted_and_exported(
            locks in prop::collection::vec(
                lock_strategy().prop_filter("no compliance", |lock| *lock != Lock::Compliance),
                0..60,
            ),
            worker_size in 1u16..8,
        ) {
            let mock = make_bucket(&locks);
            let mut config = make_test_config();
            config.worker_size = worker_size;
            let export_file = config.export_file.clone();

            let pipeline = run_pipeline(config, &mock);

            prop_assert!(!pipeline.has_error());
            prop_assert!(mock.remaining_versions().is_empty());

            let summary = pipeline.get_summary();
            prop_assert_eq!(summary.total as usize, locks.len());
            prop_assert_eq!(summary.deleted as usize, locks.len());
            prop_assert_eq!(mock.delete_calls(), locks.len());

            let records = read_export(&export_file).unwrap();
            prop_assert_eq!(records.len(), locks.len());
            let markers = records.iter().filter(|r| r.is_delete_marker).count();
            prop_assert_eq!(
                markers,
                locks.iter().filter(|lock| **lock == Lock::DeleteMarker).count()
            );

            let _ = std::fs::remove_file(export_file);
        }
    }

    // -----------------------------------------------------------------------
    // Fault isolation
    //
    // One version whose unlock fails does not stop the others: the remaining
    // N-1 versions are deleted and the run reports a failure.
    // -----------------------------------------------------------------------

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(30))]

        #[test]
        fn prop_one_failing_unlock_leaves_the_rest_processed(
            count in 2usize..40,
            failing_index in 0usize..40,
        ) {
            let failing_index = failing_index % count;
            let failing_key = format!("dir/key{failing_index:03}");
            let locks = vec![Lock::LegalHold; count];
            let mock = make_bucket(&locks).with_failing_unlock(&failing_key);
            let config = make_test_config();
            let export_file = config.export_file.clone();

            let pipeline = run_pipeline(config, &mock);

            prop_assert!(!pipeline.has_error());
            prop_assert!(pipeline.has_failure());

            let summary = pipeline.get_summary();
            prop_assert_eq!(summary.unlock_failed, 1);
            prop_assert_eq!(summary.deleted as usize, count - 1);

            let remaining = mock.remaining_versions();
            prop_assert_eq!(remaining.len(), 1);
            prop_assert_eq!(remaining[0].key(), failing_key.as_str());

            let failed = pipeline.get_failed_versions();
            prop_assert_eq!(failed.len(), 1);
            prop_assert_eq!(&failed[0].key, &failing_key);

            let _ = std::fs::remove_file(export_file);
        }
    }
}

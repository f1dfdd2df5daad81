//! Commit-time uniqueness under concurrent writers.
//!
//! The registry's pre-checks can race; these tests hit the SurrealDB adapter
//! directly and confirm the indexes alone keep exactly one winner, while
//! writers with distinct keys all get through.

use std::sync::Arc;

use exptrack_state::{
    ExperimentRepository, NewRun, StorageError, StorageResult, SurrealExperimentRepository,
};
use futures::future::join_all;
use tokio::task::JoinHandle;

const WRITERS: i64 = 16;

async fn settle<T>(
    attempts: impl IntoIterator<Item = JoinHandle<StorageResult<T>>>,
) -> Vec<StorageResult<T>> {
    join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.unwrap())
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_experiment_inserts_commit_once() {
    let repo = Arc::new(SurrealExperimentRepository::in_memory().await.unwrap());

    let results = settle((0..WRITERS).map(|i| {
        let repo = repo.clone();
        tokio::spawn(async move {
            repo.insert_experiment("contended", Some(&format!("writer {i}")))
                .await
        })
    }))
    .await;

    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one insert should commit: {results:?}");
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(
            err,
            &StorageError::DuplicateExperimentName {
                name: "contended".to_string()
            }
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_experiment_inserts_with_distinct_names_all_commit() {
    let repo = Arc::new(SurrealExperimentRepository::in_memory().await.unwrap());

    let results = settle((0..WRITERS).map(|i| {
        let repo = repo.clone();
        tokio::spawn(async move { repo.insert_experiment(&format!("exp-{i}"), None).await })
    }))
    .await;

    let mut ids: Vec<i64> = results
        .into_iter()
        .map(|r| r.unwrap().id.0)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), WRITERS as usize, "ids must be distinct");

    for i in 0..WRITERS {
        assert!(repo
            .find_experiment_by_name(&format!("exp-{i}"))
            .await
            .unwrap()
            .is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_run_inserts_commit_one_version() {
    let repo = Arc::new(SurrealExperimentRepository::in_memory().await.unwrap());
    let exp_id = repo.insert_experiment("exp", None).await.unwrap().id;

    let results = settle((0..WRITERS).map(|i| {
        let repo = repo.clone();
        tokio::spawn(async move {
            repo.insert_run_with_children(
                NewRun::new(exp_id, 1).param("writer", i.to_string()),
            )
            .await
        })
    }))
    .await;

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    for err in results.iter().filter_map(|r| r.as_ref().err()) {
        assert_eq!(
            err,
            &StorageError::DuplicateRunVersion {
                experiment_id: exp_id.0,
                version: 1
            }
        );
    }
    let versions = repo.list_run_versions(exp_id).await.unwrap();
    assert_eq!(versions.len(), 1);

    let winner = results.into_iter().find_map(|r| r.ok()).unwrap();
    let stored = repo
        .get_run_with_children(winner.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.parameters, winner.parameters);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_run_inserts_with_distinct_versions_all_commit() {
    let repo = Arc::new(SurrealExperimentRepository::in_memory().await.unwrap());
    let exp_id = repo.insert_experiment("exp", None).await.unwrap().id;

    let results = settle((1..=WRITERS).map(|version| {
        let repo = repo.clone();
        tokio::spawn(async move {
            repo.insert_run_with_children(
                NewRun::new(exp_id, version)
                    .param("version", version.to_string())
                    .metric("loss", 1.0 / version as f64),
            )
            .await
        })
    }))
    .await;

    for (version, result) in (1..=WRITERS).zip(results) {
        let run = result.unwrap();
        assert_eq!(run.version, version);
        assert_eq!(run.parameters.len(), 1);
        assert_eq!(run.metrics.len(), 1);
    }

    let versions: Vec<i64> = repo
        .list_run_versions(exp_id)
        .await
        .unwrap()
        .into_iter()
        .collect();
    assert_eq!(versions, (1..=WRITERS).collect::<Vec<_>>());
}

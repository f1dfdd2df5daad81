//! Registry behaviour through the public service API.
//!
//! Scenario tests run on the in-memory repository; the round-trip and
//! not-found checks repeat on the SurrealDB adapter so both backends are held
//! to the same observable contract.

use std::sync::Arc;

use exptrack_core::{
    ErrorKind, ExperimentId, ExperimentService, NewArtifact, NewExperiment, NewRun,
    RegistryError, RunId, RunStatus,
};
use exptrack_state::{ExperimentRepository, MemoryExperimentRepository, SurrealExperimentRepository};

fn memory_service() -> (ExperimentService, Arc<MemoryExperimentRepository>) {
    let repo = Arc::new(MemoryExperimentRepository::new());
    (ExperimentService::new(repo.clone()), repo)
}

async fn surreal_service() -> ExperimentService {
    let repo: Arc<dyn ExperimentRepository> =
        Arc::new(SurrealExperimentRepository::in_memory().await.unwrap());
    ExperimentService::new(repo)
}

fn scenario_two(experiment_id: ExperimentId) -> NewRun {
    NewRun::new(experiment_id, 1)
        .param("lr", "0.01")
        .metric("acc", 0.93)
}

// ===========================================================================
// Scenarios
// ===========================================================================

#[tokio::test]
async fn test_create_experiment_then_duplicate_conflicts() {
    let (service, _) = memory_service();

    let exp = service
        .create_experiment(NewExperiment::new("exp-1"))
        .await
        .unwrap();
    assert_eq!(exp.id, ExperimentId(1));
    assert_eq!(exp.name, "exp-1");
    assert_eq!(exp.description, None);

    let err = service
        .create_experiment(NewExperiment::new("exp-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);
    assert_eq!(err.to_string(), "experiment name 'exp-1' already exists");
}

#[tokio::test]
async fn test_create_run_defaults_to_running_and_echoes_children() {
    let (service, _) = memory_service();
    let exp = service
        .create_experiment(NewExperiment::new("exp-1"))
        .await
        .unwrap();

    let run = service.create_run(scenario_two(exp.id)).await.unwrap();

    assert_eq!(run.id, RunId(1));
    assert_eq!(run.version, 1);
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.parameters.len(), 1);
    assert_eq!(run.parameters[0].key, "lr");
    assert_eq!(run.parameters[0].value, "0.01");
    assert_eq!(run.metrics.len(), 1);
    assert_eq!(run.metrics[0].key, "acc");
    assert_eq!(run.metrics[0].value, 0.93);
    assert!(run.artifacts.is_empty());
}

#[tokio::test]
async fn test_repeated_version_conflicts_with_message() {
    let (service, _) = memory_service();
    let exp = service
        .create_experiment(NewExperiment::new("exp-1"))
        .await
        .unwrap();
    service.create_run(scenario_two(exp.id)).await.unwrap();

    let err = service.create_run(scenario_two(exp.id)).await.unwrap_err();
    assert_eq!(
        err,
        RegistryError::RunVersionTaken {
            experiment_id: exp.id,
            version: 1
        }
    );
    assert_eq!(err.to_string(), "version 1 already exists for experiment 1");
}

#[tokio::test]
async fn test_run_for_unknown_experiment_is_not_found() {
    let (service, _) = memory_service();
    let err = service
        .create_run(NewRun::new(ExperimentId(999), 1))
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.to_string(), "experiment 999 not found");
}

#[tokio::test]
async fn test_get_run_matches_create_payload() {
    let (service, _) = memory_service();
    let exp = service
        .create_experiment(NewExperiment::new("exp-1"))
        .await
        .unwrap();
    let created = service.create_run(scenario_two(exp.id)).await.unwrap();

    let fetched = service.get_run(created.id).await.unwrap();
    assert_eq!(fetched, created);
}

// ===========================================================================
// Properties
// ===========================================================================

#[tokio::test]
async fn test_same_version_under_other_experiment_succeeds() {
    let (service, _) = memory_service();
    let a = service
        .create_experiment(NewExperiment::new("a"))
        .await
        .unwrap();
    let b = service
        .create_experiment(NewExperiment::new("b"))
        .await
        .unwrap();

    service.create_run(NewRun::new(a.id, 1)).await.unwrap();
    service.create_run(NewRun::new(b.id, 1)).await.unwrap();
    assert!(service.create_run(NewRun::new(a.id, 1)).await.is_err());
}

#[tokio::test]
async fn test_failed_create_run_leaves_nothing_behind() {
    let (service, repo) = memory_service();
    let exp = service
        .create_experiment(NewExperiment::new("exp"))
        .await
        .unwrap();

    let failures = vec![
        NewRun::new(exp.id, 0).param("a", "1"),
        NewRun::new(exp.id, 1).param("", "1"),
        NewRun::new(exp.id, 1).param("a", ""),
        NewRun::new(exp.id, 1).metric("", 1.0),
        NewRun::new(exp.id, 1).metric("loss", f64::INFINITY),
        NewRun::new(exp.id, 1).artifact(NewArtifact::new("")),
    ];
    for input in failures {
        let err = service.create_run(input).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation, "{err}");
    }

    assert_eq!(repo.run_count(), 0);
    assert!(repo.list_run_versions(exp.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_round_trip_preserves_order_and_duplicates() {
    let (service, _) = memory_service();
    let exp = service
        .create_experiment(NewExperiment::new("exp").with_description("ordering"))
        .await
        .unwrap();

    let input = NewRun::new(exp.id, 4)
        .with_status(RunStatus::Failed)
        .param("seed", "1")
        .param("seed", "2")
        .param("opt", "adam")
        .metric("loss", 0.9)
        .metric("loss", 0.5)
        .metric("loss", 0.2)
        .artifact(NewArtifact::new("logs/train.log").with_type("log"))
        .artifact(NewArtifact::new("ckpt/final.pt").with_type("model"));
    let created = service.create_run(input.clone()).await.unwrap();
    let fetched = service.get_run(created.id).await.unwrap();

    let params: Vec<(String, String)> = fetched
        .parameters
        .iter()
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect();
    let supplied: Vec<(String, String)> = input
        .parameters
        .iter()
        .map(|p| (p.key.clone(), p.value.clone()))
        .collect();
    assert_eq!(params, supplied);

    let losses: Vec<f64> = fetched.metrics.iter().map(|m| m.value).collect();
    assert_eq!(losses, vec![0.9, 0.5, 0.2]);

    let paths: Vec<&str> = fetched
        .artifacts
        .iter()
        .map(|a| a.file_path.as_str())
        .collect();
    assert_eq!(paths, vec!["logs/train.log", "ckpt/final.pt"]);
    assert_eq!(fetched.status, RunStatus::Failed);
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let (service, _) = memory_service();
    let err = service.get_run(RunId(77)).await.unwrap_err();
    assert_eq!(err, RegistryError::RunNotFound(RunId(77)));
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_names_are_case_sensitive() {
    let (service, _) = memory_service();
    service
        .create_experiment(NewExperiment::new("Exp"))
        .await
        .unwrap();
    service
        .create_experiment(NewExperiment::new("exp"))
        .await
        .unwrap();
}

// ===========================================================================
// SurrealDB-backed
// ===========================================================================

#[tokio::test]
async fn test_surreal_scenarios_end_to_end() {
    let service = surreal_service().await;

    let exp = service
        .create_experiment(NewExperiment::new("exp-1").with_description("surreal"))
        .await
        .unwrap();
    assert_eq!(
        service
            .create_experiment(NewExperiment::new("exp-1"))
            .await
            .unwrap_err()
            .kind(),
        ErrorKind::Conflict
    );

    let created = service
        .create_run(scenario_two(exp.id).artifact(NewArtifact::new("model.onnx")))
        .await
        .unwrap();
    assert_eq!(created.status, RunStatus::Running);
    assert_eq!(
        service.create_run(scenario_two(exp.id)).await.unwrap_err(),
        RegistryError::RunVersionTaken {
            experiment_id: exp.id,
            version: 1
        }
    );

    let fetched = service.get_run(created.id).await.unwrap();
    assert_eq!(fetched.parameters, created.parameters);
    assert_eq!(fetched.artifacts, created.artifacts);
    assert_eq!(fetched.metrics.len(), 1);
    assert_eq!(fetched.metrics[0].value, 0.93);
}

#[tokio::test]
async fn test_surreal_not_found_is_client_fault() {
    let service = surreal_service().await;

    let err = service
        .create_run(NewRun::new(ExperimentId(999), 1))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    let err = service.get_run(RunId(1)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

//! SurrealDB schema migrations and initialization
//!
//! Sets up every exptrack table with the constraints the registry depends on.
//! The unique indexes here are the commit-time enforcement of experiment-name
//! and run-version uniqueness; the events keep child rows from outliving
//! their parent.

use crate::error::StateError;
use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Index names referenced when classifying constraint violations.
pub const IDX_EXPERIMENT_NAME: &str = "idx_experiment_name";
pub const IDX_RUN_EXPERIMENT_VERSION: &str = "idx_run_experiment_version";

/// Initialize all exptrack tables in SurrealDB
///
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing exptrack SurrealDB schema");

    init_counters_table(db).await?;
    init_experiments_table(db).await?;
    init_runs_table(db).await?;
    init_run_children_tables(db).await?;
    init_cascade_events(db).await?;

    info!("exptrack schema initialization complete");
    Ok(())
}

async fn apply(db: &Surreal<Any>, table: &str, sql: &str) -> Result<()> {
    let mut response = db
        .query(sql)
        .await
        .map_err(|e| StateError::SchemaSetup(format!("{table}: {e}")))?;
    let errors = response.take_errors();
    if let Some((_, err)) = errors.into_iter().next() {
        return Err(StateError::SchemaSetup(format!("{table}: {err}")));
    }
    Ok(())
}

/// Initialize `counters` table used for integer id allocation
///
/// One record per sequence (`counters:experiments`, `counters:runs`), bumped
/// inside the same transaction that creates the row it numbers.
async fn init_counters_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing counters table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS counters SCHEMALESS;
    "#;

    apply(db, "counters", sql).await?;
    info!("✓ counters table initialized");
    Ok(())
}

/// Initialize `experiments` table
///
/// Schema:
/// ```text
/// TABLE experiments {
///   experiment_id:  INT (unique)
///   name:           STRING (unique, non-empty, case-sensitive)
///   description:    STRING?
///   created_at:     DATETIME
/// }
/// ```
async fn init_experiments_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing experiments table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS experiments SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS experiment_id ON experiments TYPE int;
        DEFINE FIELD IF NOT EXISTS name ON experiments TYPE string ASSERT string::len($value) > 0;
        DEFINE FIELD IF NOT EXISTS description ON experiments TYPE option<string>;
        DEFINE FIELD IF NOT EXISTS created_at ON experiments TYPE datetime;

        DEFINE INDEX IF NOT EXISTS idx_experiment_id ON TABLE experiments COLUMNS experiment_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_experiment_name ON TABLE experiments COLUMNS name UNIQUE;
    "#;

    apply(db, "experiments", sql).await?;
    info!("✓ experiments table initialized");
    Ok(())
}

/// Initialize `runs` table
///
/// Schema:
/// ```text
/// TABLE runs {
///   run_id:         INT (unique)
///   experiment_id:  INT (references experiments.experiment_id)
///   version:        INT (> 0)
///   status:         STRING (enum: running | completed | failed)
///   started_at:     DATETIME
/// }
/// ```
///
/// Constraints:
/// - `(experiment_id, version)` is unique; versions repeat across experiments
async fn init_runs_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing runs table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS runs SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS run_id ON runs TYPE int;
        DEFINE FIELD IF NOT EXISTS experiment_id ON runs TYPE int;
        DEFINE FIELD IF NOT EXISTS version ON runs TYPE int ASSERT $value > 0;
        DEFINE FIELD IF NOT EXISTS status ON runs TYPE string
            ASSERT $value IN ["running", "completed", "failed"];
        DEFINE FIELD IF NOT EXISTS started_at ON runs TYPE datetime;

        DEFINE INDEX IF NOT EXISTS idx_run_id ON TABLE runs COLUMNS run_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_run_experiment_version ON TABLE runs COLUMNS experiment_id, version UNIQUE;
    "#;

    apply(db, "runs", sql).await?;
    info!("✓ runs table initialized");
    Ok(())
}

/// Initialize `parameters`, `metrics`, `artifacts`
///
/// Each row carries `run_id` and `seq`, its position in the list supplied at
/// run creation. `(run_id, seq)` is unique per table; reads order by `seq`.
async fn init_run_children_tables(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing run child tables");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS parameters SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS run_id ON parameters TYPE int;
        DEFINE FIELD IF NOT EXISTS seq ON parameters TYPE int;
        DEFINE FIELD IF NOT EXISTS key ON parameters TYPE string ASSERT string::len($value) > 0;
        DEFINE FIELD IF NOT EXISTS value ON parameters TYPE string ASSERT string::len($value) > 0;
        DEFINE INDEX IF NOT EXISTS idx_parameter_run_seq ON TABLE parameters COLUMNS run_id, seq UNIQUE;

        DEFINE TABLE IF NOT EXISTS metrics SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS run_id ON metrics TYPE int;
        DEFINE FIELD IF NOT EXISTS seq ON metrics TYPE int;
        DEFINE FIELD IF NOT EXISTS key ON metrics TYPE string ASSERT string::len($value) > 0;
        DEFINE FIELD IF NOT EXISTS value ON metrics TYPE float;
        DEFINE FIELD IF NOT EXISTS timestamp ON metrics TYPE datetime;
        DEFINE INDEX IF NOT EXISTS idx_metric_run_seq ON TABLE metrics COLUMNS run_id, seq UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_metric_run_key ON TABLE metrics COLUMNS run_id, key;

        DEFINE TABLE IF NOT EXISTS artifacts SCHEMAFULL;
        DEFINE FIELD IF NOT EXISTS run_id ON artifacts TYPE int;
        DEFINE FIELD IF NOT EXISTS seq ON artifacts TYPE int;
        DEFINE FIELD IF NOT EXISTS file_path ON artifacts TYPE string ASSERT string::len($value) > 0;
        DEFINE FIELD IF NOT EXISTS artifact_type ON artifacts TYPE option<string>;
        DEFINE INDEX IF NOT EXISTS idx_artifact_run_seq ON TABLE artifacts COLUMNS run_id, seq UNIQUE;
    "#;

    apply(db, "run children", sql).await?;
    info!("✓ parameters, metrics, artifacts tables initialized");
    Ok(())
}

/// Cascade deletes down the ownership chain
///
/// experiments -> runs -> {parameters, metrics, artifacts}. Nothing in the
/// registry deletes today; these keep a manual or future delete from leaving
/// orphans.
async fn init_cascade_events(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing cascade events");

    let sql = r#"
        DEFINE EVENT IF NOT EXISTS cascade_experiment_runs ON TABLE experiments
            WHEN $event = "DELETE"
            THEN (DELETE runs WHERE experiment_id = $before.experiment_id);

        DEFINE EVENT IF NOT EXISTS cascade_run_children ON TABLE runs
            WHEN $event = "DELETE"
            THEN {
                DELETE parameters WHERE run_id = $before.run_id;
                DELETE metrics WHERE run_id = $before.run_id;
                DELETE artifacts WHERE run_id = $before.run_id;
            };
    "#;

    apply(db, "cascade events", sql).await?;
    info!("✓ cascade events initialized");
    Ok(())
}

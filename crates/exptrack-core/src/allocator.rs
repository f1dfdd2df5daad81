//! Run version admission.
//!
//! The pre-check here only gives fast feedback. Two callers can both pass it
//! for the same version; the repository's commit-time constraint decides
//! which one wins.

use exptrack_state::{validate_version, ExperimentId, ExperimentRepository};
use tracing::debug;

use crate::error::{RegistryError, Result};

/// Decides whether a caller-chosen version may be attempted for an experiment.
pub struct RunVersionAllocator<'a> {
    repo: &'a dyn ExperimentRepository,
}

impl<'a> RunVersionAllocator<'a> {
    pub fn new(repo: &'a dyn ExperimentRepository) -> Self {
        Self { repo }
    }

    /// Reject non-positive versions, then versions already committed.
    ///
    /// Versions need not be contiguous or start at 1.
    pub async fn check(&self, experiment_id: ExperimentId, version: i64) -> Result<()> {
        validate_version(version)?;

        let taken = self.repo.list_run_versions(experiment_id).await?;
        if taken.contains(&version) {
            debug!(%experiment_id, version, "version rejected by pre-check");
            return Err(RegistryError::RunVersionTaken {
                experiment_id,
                version,
            });
        }
        Ok(())
    }
}

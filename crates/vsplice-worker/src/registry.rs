//! In-process job registry.
//!
//! Tracks `processing -> done | error` for every submitted job. The pipeline
//! never touches the registry directly; it only sees a [`RegistrySink`].
//!
//! [`RegistrySink`]: crate::progress::RegistrySink

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use thiserror::Error;
use vsplice_models::{Checkpoint, JobId, JobRecord, TransitionError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already registered: {0}")]
    AlreadyExists(JobId),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Registry lock poisoned")]
    Poisoned,
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Shared, cloneable registry of job records.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job in the `processing` state.
    pub fn create(&self, job_id: JobId) -> RegistryResult<JobRecord> {
        let mut jobs = self.jobs.write().map_err(|_| RegistryError::Poisoned)?;
        if jobs.contains_key(&job_id) {
            return Err(RegistryError::AlreadyExists(job_id));
        }
        let record = JobRecord::new(job_id.clone());
        jobs.insert(job_id, record.clone());
        Ok(record)
    }

    pub fn get(&self, job_id: &JobId) -> Option<JobRecord> {
        self.jobs.read().ok()?.get(job_id).cloned()
    }

    /// Snapshot of every job.
    pub fn list(&self) -> Vec<JobRecord> {
        self.jobs
            .read()
            .map(|jobs| jobs.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn record_checkpoint(&self, job_id: &JobId, checkpoint: &Checkpoint) -> RegistryResult<()> {
        self.update(job_id, |record| {
            record.record_checkpoint(checkpoint);
            Ok(())
        })
        .map(|_| ())
    }

    /// Transition to `done`.
    pub fn complete(&self, job_id: &JobId, run_dir: impl Into<String>) -> RegistryResult<JobRecord> {
        let run_dir = run_dir.into();
        self.update(job_id, |record| Ok(record.complete(run_dir)?))
    }

    /// Transition to `error`.
    pub fn fail(&self, job_id: &JobId, message: impl Into<String>) -> RegistryResult<JobRecord> {
        let message = message.into();
        self.update(job_id, |record| Ok(record.fail(message)?))
    }

    /// Apply `f` under the write lock and return the updated record.
    fn update<F>(&self, job_id: &JobId, f: F) -> RegistryResult<JobRecord>
    where
        F: FnOnce(&mut JobRecord) -> RegistryResult<()>,
    {
        let mut jobs = self.jobs.write().map_err(|_| RegistryError::Poisoned)?;
        let record = jobs
            .get_mut(job_id)
            .ok_or_else(|| RegistryError::NotFound(job_id.clone()))?;
        f(record)?;
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vsplice_models::{JobStatus, Stage};

    #[test]
    fn test_lifecycle() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();
        registry.create(job_id.clone()).unwrap();
        assert!(matches!(
            registry.create(job_id.clone()),
            Err(RegistryError::AlreadyExists(_))
        ));

        registry
            .record_checkpoint(&job_id, &Checkpoint::new(Stage::Sample, "Sampling"))
            .unwrap();
        let done = registry.complete(&job_id, "/runs/x").unwrap();
        assert_eq!(done.status, JobStatus::Done);
        assert_eq!(done.run_dir.as_deref(), Some("/runs/x"));

        assert!(matches!(
            registry.fail(&job_id, "late"),
            Err(RegistryError::Transition(_))
        ));
        assert_eq!(registry.get(&job_id).unwrap().status, JobStatus::Done);
    }

    #[test]
    fn test_record_checkpoint_advances_sequence() {
        let registry = JobRegistry::new();
        let job_id = JobId::new();
        registry.create(job_id.clone()).unwrap();

        let result: RegistryResult<()> =
            registry.record_checkpoint(&job_id, &Checkpoint::new(Stage::Embed, "Embedding"));
        assert!(result.is_ok());
        registry
            .record_checkpoint(&job_id, &Checkpoint::new(Stage::Segment, "Clustering"))
            .unwrap();

        let record = registry.get(&job_id).unwrap();
        assert_eq!(record.event_seq, 2);
        assert_eq!(record.last_stage, Some(Stage::Segment));
        assert!(matches!(
            registry.record_checkpoint(&JobId::new(), &Checkpoint::new(Stage::Init, "x")),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_unknown_job() {
        let registry = JobRegistry::new();
        assert!(matches!(
            registry.fail(&JobId::new(), "x"),
            Err(RegistryError::NotFound(_))
        ));
        assert!(registry.list().is_empty());
    }
}

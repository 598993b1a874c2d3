//! Job executor.
//!
//! Runs pipeline invocations on the blocking thread pool, limited by a
//! semaphore, and keeps the job registry in step with their outcomes.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use vsplice_models::JobId;

use crate::error::StageFailure;
use crate::logging::JobLogger;
use crate::pipeline::{Pipeline, RunOutput};
use crate::progress::{FanoutSink, LogSink, RegistrySink};
use crate::registry::{JobRegistry, RegistryError};

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error(transparent)]
    Stage(#[from] StageFailure),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Job task failed: {0}")]
    Join(String),

    #[error("Executor is shut down")]
    Closed,
}

pub type ExecutorResult<T> = Result<T, ExecutorError>;

/// Handle to a submitted job.
pub struct JobHandle {
    pub job_id: JobId,
    handle: JoinHandle<ExecutorResult<RunOutput>>,
}

impl JobHandle {
    /// Wait for the job to finish.
    pub async fn wait(self) -> ExecutorResult<RunOutput> {
        self.handle
            .await
            .map_err(|e| ExecutorError::Join(e.to_string()))?
    }
}

/// Submits pipeline runs with bounded concurrency.
pub struct JobExecutor {
    pipeline: Arc<Pipeline>,
    registry: JobRegistry,
    job_semaphore: Arc<Semaphore>,
}

impl JobExecutor {
    pub fn new(pipeline: Pipeline, registry: JobRegistry) -> Self {
        let max_jobs = pipeline.config().max_concurrent_jobs.max(1);
        info!("Starting job executor with {} max concurrent jobs", max_jobs);

        Self {
            pipeline: Arc::new(pipeline),
            registry,
            job_semaphore: Arc::new(Semaphore::new(max_jobs)),
        }
    }

    pub fn registry(&self) -> &JobRegistry {
        &self.registry
    }

    /// Register a job and start it once a slot is free.
    pub fn submit(&self, source: PathBuf, prefix: Option<String>) -> ExecutorResult<JobHandle> {
        let job_id = JobId::new();
        self.registry.create(job_id.clone())?;

        let pipeline = Arc::clone(&self.pipeline);
        let registry = self.registry.clone();
        let semaphore = Arc::clone(&self.job_semaphore);
        let task_job_id = job_id.clone();

        let handle = tokio::spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    if let Err(e) = registry.fail(&task_job_id, "executor shut down") {
                        warn!("Failed to mark job {} as failed: {}", task_job_id, e);
                    }
                    return Err(ExecutorError::Closed);
                }
            };

            Self::execute_job(pipeline, registry, task_job_id, source, prefix).await
        });

        Ok(JobHandle { job_id, handle })
    }

    async fn execute_job(
        pipeline: Arc<Pipeline>,
        registry: JobRegistry,
        job_id: JobId,
        source: PathBuf,
        prefix: Option<String>,
    ) -> ExecutorResult<RunOutput> {
        info!("Executing job {}", job_id);

        let sink = FanoutSink::new()
            .with(Arc::new(LogSink::new(JobLogger::new(&job_id))))
            .with(Arc::new(RegistrySink::new(registry.clone(), job_id.clone())));

        let run_job_id = job_id.clone();
        let result = tokio::task::spawn_blocking(move || {
            pipeline.run(&run_job_id, &source, prefix.as_deref(), &sink)
        })
        .await;

        match result {
            Ok(Ok(output)) => {
                registry.complete(&job_id, output.run_dir.to_string_lossy())?;
                info!("Job {} completed successfully", job_id);
                Ok(output)
            }
            Ok(Err(failure)) => {
                error!("Job {} failed: {}", job_id, failure);
                registry.fail(&job_id, failure.to_string())?;
                Err(failure.into())
            }
            Err(join_error) => {
                error!("Job {} panicked: {}", job_id, join_error);
                registry.fail(&job_id, join_error.to_string())?;
                Err(ExecutorError::Join(join_error.to_string()))
            }
        }
    }

    /// Stop accepting queued jobs. Jobs already running finish normally.
    pub fn close(&self) {
        self.job_semaphore.close();
    }
}

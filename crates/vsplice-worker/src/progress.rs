//! Progress sinks.
//!
//! The orchestrator reports checkpoints through [`ProgressSink`]. Sink errors
//! are logged by the caller and never fail a job.

use std::sync::Arc;

use thiserror::Error;
use vsplice_models::{Checkpoint, JobId};

use crate::logging::JobLogger;
use crate::registry::JobRegistry;

#[derive(Debug, Error)]
#[error("Progress sink failed: {0}")]
pub struct SinkError(pub String);

impl SinkError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Receives checkpoints in call order. Must not block indefinitely.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, checkpoint: &Checkpoint) -> Result<(), SinkError>;
}

/// Logs each checkpoint through the job logger.
#[derive(Debug, Clone)]
pub struct LogSink {
    logger: JobLogger,
}

impl LogSink {
    pub fn new(logger: JobLogger) -> Self {
        Self { logger }
    }
}

impl ProgressSink for LogSink {
    fn emit(&self, checkpoint: &Checkpoint) -> Result<(), SinkError> {
        self.logger.checkpoint(checkpoint);
        Ok(())
    }
}

/// Discards checkpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSink;

impl ProgressSink for NoopSink {
    fn emit(&self, _checkpoint: &Checkpoint) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Records the latest checkpoint of one job in the registry.
#[derive(Clone)]
pub struct RegistrySink {
    registry: JobRegistry,
    job_id: JobId,
}

impl RegistrySink {
    pub fn new(registry: JobRegistry, job_id: JobId) -> Self {
        Self { registry, job_id }
    }
}

impl ProgressSink for RegistrySink {
    fn emit(&self, checkpoint: &Checkpoint) -> Result<(), SinkError> {
        self.registry
            .record_checkpoint(&self.job_id, checkpoint)
            .map_err(|e| SinkError::new(e.to_string()))
    }
}

/// Forwards every checkpoint to several sinks.
///
/// All sinks are tried; the first error is returned afterwards.
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for FanoutSink {
    fn emit(&self, checkpoint: &Checkpoint) -> Result<(), SinkError> {
        let mut first_error = None;
        for sink in &self.sinks {
            if let Err(e) = sink.emit(checkpoint) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

/// Collects checkpoints in memory.
#[cfg(test)]
#[derive(Default)]
pub(crate) struct CollectingSink {
    pub events: std::sync::Mutex<Vec<Checkpoint>>,
}

#[cfg(test)]
impl ProgressSink for CollectingSink {
    fn emit(&self, checkpoint: &Checkpoint) -> Result<(), SinkError> {
        self.events.lock().unwrap().push(checkpoint.clone());
        Ok(())
    }
}

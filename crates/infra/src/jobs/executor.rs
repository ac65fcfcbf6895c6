//! Synchronous job runner.
//!
//! Callers drain the queue with [`JobExecutor::run_pending`], from a worker
//! loop or from a test standing in for one.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use shipadvice_core::TenantId;

use super::store::{JobStore, JobStoreError};
use super::types::{Job, JobStatus};

/// Performs the work of a claimed job. An `Err` is the failure reason.
pub trait JobHandler: Send + Sync {
    fn handle(&self, job: &Job) -> Result<(), String>;
}

impl<F> JobHandler for F
where
    F: Fn(&Job) -> Result<(), String> + Send + Sync,
{
    fn handle(&self, job: &Job) -> Result<(), String> {
        self(job)
    }
}

impl<H: JobHandler + ?Sized> JobHandler for Arc<H> {
    fn handle(&self, job: &Job) -> Result<(), String> {
        (**self).handle(job)
    }
}

/// Outcome counts of one [`JobExecutor::run_pending`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub dead_lettered: usize,
}

impl RunSummary {
    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.dead_lettered
    }
}

pub struct JobExecutor<S, H> {
    store: S,
    handler: H,
}

impl<S, H> JobExecutor<S, H>
where
    S: JobStore,
    H: JobHandler,
{
    pub fn new(store: S, handler: H) -> Self {
        Self { store, handler }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Run a job claimed from the store and record how it went.
    ///
    /// A failed job is rescheduled, or moved to the dead letters once its
    /// retry policy is exhausted.
    pub fn execute_one(&self, job: &mut Job) -> Result<(), JobStoreError> {
        match self.handler.handle(job) {
            Ok(()) => {
                job.succeed();
                self.store.update(job)?;
                debug!(job_id = %job.id, kind = job.work.kind(), attempt = job.attempt, "job completed");
            }
            Err(error) => {
                job.fail(error.clone(), Utc::now());
                if job.is_dead_lettered() {
                    warn!(job_id = %job.id, kind = job.work.kind(), %error, attempts = job.attempt, "job dead-lettered");
                    self.store.dead_letter(job.clone())?;
                } else {
                    debug!(job_id = %job.id, kind = job.work.kind(), %error, attempt = job.attempt, "job failed, retry scheduled");
                    self.store.update(job)?;
                }
            }
        }
        Ok(())
    }

    /// Claim and run ready jobs, optionally of one tenant, until none is left.
    pub fn run_pending(&self, tenant_id: Option<TenantId>) -> Result<RunSummary, JobStoreError> {
        let mut summary = RunSummary::default();

        while let Some(mut job) = self.store.claim_next(tenant_id)? {
            self.execute_one(&mut job)?;
            if job.is_dead_lettered() {
                summary.dead_lettered += 1;
            } else if job.status == JobStatus::Completed {
                summary.succeeded += 1;
            } else {
                summary.failed += 1;
            }
        }

        if summary.processed() > 0 {
            info!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                dead_lettered = summary.dead_lettered,
                "job queue drained"
            );
        }
        Ok(summary)
    }
}

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use shipadvice_core::TenantId;

use super::types::{Job, JobId, JobStatus};

/// Persistence for queued jobs.
///
/// Jobs are claimed oldest first. Dead-lettered jobs leave the queue and are
/// kept apart until requeued by hand.
pub trait JobStore: Send + Sync {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError>;

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError>;

    fn update(&self, job: &Job) -> Result<(), JobStoreError>;

    /// Oldest ready job, already started. `None` when nothing is ready.
    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError>;

    /// Queued jobs of a tenant, oldest first.
    fn list(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Job>, JobStoreError>;

    fn dead_letter(&self, job: Job) -> Result<(), JobStoreError>;

    fn dead_letters(&self, tenant_id: TenantId) -> Result<Vec<Job>, JobStoreError>;

    /// Back in the queue with a fresh attempt count.
    fn requeue_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum JobStoreError {
    #[error("job not found: {0}")]
    NotFound(JobId),
    #[error("job {0} belongs to another tenant")]
    TenantIsolation(JobId),
    #[error("job already queued: {0}")]
    AlreadyExists(JobId),
    #[error("job storage: {0}")]
    Storage(String),
}

#[derive(Debug, Default)]
struct Queues {
    // JobId is time-ordered, so key order is enqueue order.
    queued: BTreeMap<JobId, Job>,
    dead: BTreeMap<JobId, Job>,
}

#[derive(Debug, Default)]
pub struct InMemoryJobStore {
    queues: Mutex<Queues>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Queues>, JobStoreError> {
        self.queues
            .lock()
            .map_err(|_| JobStoreError::Storage("job queue lock poisoned".to_string()))
    }
}

fn owned_by(job: &Job, tenant_id: TenantId) -> Result<(), JobStoreError> {
    if job.tenant_id == tenant_id {
        Ok(())
    } else {
        Err(JobStoreError::TenantIsolation(job.id))
    }
}

impl JobStore for InMemoryJobStore {
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        let mut queues = self.lock()?;
        if queues.queued.contains_key(&job.id) || queues.dead.contains_key(&job.id) {
            return Err(JobStoreError::AlreadyExists(job.id));
        }
        let id = job.id;
        queues.queued.insert(id, job);
        Ok(id)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        let queues = self.lock()?;
        let Some(job) = queues.queued.get(&job_id).or_else(|| queues.dead.get(&job_id)) else {
            return Ok(None);
        };
        owned_by(job, tenant_id)?;
        Ok(Some(job.clone()))
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        let mut queues = self.lock()?;
        let slot = queues
            .queued
            .get_mut(&job.id)
            .ok_or(JobStoreError::NotFound(job.id))?;
        owned_by(slot, job.tenant_id)?;
        *slot = job.clone();
        Ok(())
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        let mut queues = self.lock()?;
        let now = Utc::now();
        let next = queues
            .queued
            .values_mut()
            .find(|j| j.is_ready(now) && tenant_id.map_or(true, |t| j.tenant_id == t));

        Ok(next.map(|job| {
            job.start();
            job.clone()
        }))
    }

    fn list(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        let queues = self.lock()?;
        Ok(queues
            .queued
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .take(limit)
            .cloned()
            .collect())
    }

    fn dead_letter(&self, job: Job) -> Result<(), JobStoreError> {
        let mut queues = self.lock()?;
        queues.queued.remove(&job.id);
        queues.dead.insert(job.id, job);
        Ok(())
    }

    fn dead_letters(&self, tenant_id: TenantId) -> Result<Vec<Job>, JobStoreError> {
        let queues = self.lock()?;
        Ok(queues
            .dead
            .values()
            .filter(|j| j.tenant_id == tenant_id)
            .cloned()
            .collect())
    }

    fn requeue_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        let mut queues = self.lock()?;
        let job = queues.dead.get(&job_id).ok_or(JobStoreError::NotFound(job_id))?;
        owned_by(job, tenant_id)?;

        let Some(mut job) = queues.dead.remove(&job_id) else {
            return Err(JobStoreError::NotFound(job_id));
        };
        job.status = JobStatus::Pending;
        job.attempt = 0;
        job.not_before = None;
        queues.queued.insert(job_id, job.clone());
        Ok(job)
    }
}

impl<S> JobStore for Arc<S>
where
    S: JobStore + ?Sized,
{
    fn enqueue(&self, job: Job) -> Result<JobId, JobStoreError> {
        (**self).enqueue(job)
    }

    fn get(&self, tenant_id: TenantId, job_id: JobId) -> Result<Option<Job>, JobStoreError> {
        (**self).get(tenant_id, job_id)
    }

    fn update(&self, job: &Job) -> Result<(), JobStoreError> {
        (**self).update(job)
    }

    fn claim_next(&self, tenant_id: Option<TenantId>) -> Result<Option<Job>, JobStoreError> {
        (**self).claim_next(tenant_id)
    }

    fn list(&self, tenant_id: TenantId, limit: usize) -> Result<Vec<Job>, JobStoreError> {
        (**self).list(tenant_id, limit)
    }

    fn dead_letter(&self, job: Job) -> Result<(), JobStoreError> {
        (**self).dead_letter(job)
    }

    fn dead_letters(&self, tenant_id: TenantId) -> Result<Vec<Job>, JobStoreError> {
        (**self).dead_letters(tenant_id)
    }

    fn requeue_dead_letter(&self, tenant_id: TenantId, job_id: JobId) -> Result<Job, JobStoreError> {
        (**self).requeue_dead_letter(tenant_id, job_id)
    }
}

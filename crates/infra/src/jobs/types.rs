use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use shipadvice_core::TenantId;
use shipadvice_stock::TransferId;

/// Kind name of the deferred invoicing job.
pub const INVOICING_AT_SHIPPING: &str = "stock.invoicing_at_shipping";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Display::fmt(&self.0, f)
    }
}

/// What a job does once claimed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JobWork {
    /// Run the invoicing chain on a validated transfer.
    InvoicingAtShipping { transfer_id: TransferId },
}

impl JobWork {
    pub fn kind(&self) -> &'static str {
        match self {
            JobWork::InvoicingAtShipping { .. } => INVOICING_AT_SHIPPING,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    /// Waiting for its retry at `Job::not_before`.
    Failed { error: String },
    /// Out of attempts.
    DeadLettered { error: String },
}

impl JobStatus {
    pub fn is_claimable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Failed { .. })
    }
}

/// Exponential backoff: `base_delay * 2^(attempt - 1)`, capped at `max_delay`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Attempts allowed, the first run included.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self::default().with_max_attempts(1)
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Wait after the `attempt`-th failure (1-indexed).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Tenant-scoped unit of deferred work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub tenant_id: TenantId,
    pub work: JobWork,
    pub status: JobStatus,
    pub retry_policy: RetryPolicy,
    /// Attempts started so far.
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
    pub not_before: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(tenant_id: TenantId, work: JobWork) -> Self {
        Self {
            id: JobId::new(),
            tenant_id,
            work,
            status: JobStatus::Pending,
            retry_policy: RetryPolicy::default(),
            attempt: 0,
            enqueued_at: Utc::now(),
            not_before: None,
        }
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    pub fn is_ready(&self, now: DateTime<Utc>) -> bool {
        self.status.is_claimable() && self.not_before.map_or(true, |at| now >= at)
    }

    pub fn start(&mut self) {
        self.status = JobStatus::Running;
        self.attempt += 1;
    }

    pub fn succeed(&mut self) {
        self.status = JobStatus::Completed;
        self.not_before = None;
    }

    /// Schedule a retry, or dead-letter the job once attempts run out.
    pub fn fail(&mut self, error: String, now: DateTime<Utc>) {
        if self.retry_policy.allows_retry_after(self.attempt) {
            let delay = self.retry_policy.delay_after(self.attempt);
            self.not_before = Some(now + chrono::Duration::from_std(delay).unwrap_or_default());
            self.status = JobStatus::Failed { error };
        } else {
            self.not_before = None;
            self.status = JobStatus::DeadLettered { error };
        }
    }

    pub fn is_dead_lettered(&self) -> bool {
        matches!(self.status, JobStatus::DeadLettered { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoicing_job() -> Job {
        Job::new(
            TenantId::new(),
            JobWork::InvoicingAtShipping {
                transfer_id: TransferId::generate(),
            },
        )
    }

    #[test]
    fn backoff_doubles_up_to_the_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(300),
        };

        assert_eq!(policy.delay_after(1), Duration::from_millis(100));
        assert_eq!(policy.delay_after(2), Duration::from_millis(200));
        assert_eq!(policy.delay_after(3), Duration::from_millis(300));
        assert_eq!(policy.delay_after(40), Duration::from_millis(300));
    }

    #[test]
    fn max_attempts_counts_the_first_run() {
        let policy = RetryPolicy::default().with_max_attempts(2);
        assert!(policy.allows_retry_after(1));
        assert!(!policy.allows_retry_after(2));
        assert!(!RetryPolicy::no_retry().allows_retry_after(1));
    }

    #[test]
    fn failed_job_waits_for_its_backoff() {
        let mut job = invoicing_job()
            .with_retry_policy(RetryPolicy::default().with_base_delay(Duration::from_secs(10)));
        let now = Utc::now();

        job.start();
        job.fail("transfer locked".to_string(), now);

        assert!(!job.is_ready(now));
        assert!(job.is_ready(now + chrono::Duration::seconds(10)));
    }

    #[test]
    fn last_attempt_dead_letters() {
        let mut job = invoicing_job().with_retry_policy(RetryPolicy::no_retry());
        job.start();
        job.fail("boom".to_string(), Utc::now());

        assert!(job.is_dead_lettered());
        assert!(!job.is_ready(Utc::now()));
    }

    #[test]
    fn work_serializes_with_its_kind() {
        let job = invoicing_job();
        let json = serde_json::to_value(&job.work).unwrap();
        assert_eq!(json["kind"], "invoicing_at_shipping");
        assert_eq!(job.work.kind(), "stock.invoicing_at_shipping");
    }
}

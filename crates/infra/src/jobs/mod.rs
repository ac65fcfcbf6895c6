//! Background job queue with retry, backoff, and dead letters.
//!
//! Validated transfers can hand their invoicing to a
//! `stock.invoicing_at_shipping` job instead of running it inline.

pub mod executor;
pub mod store;
pub mod types;

pub use executor::{JobExecutor, JobHandler, RunSummary};
pub use store::{InMemoryJobStore, JobStore, JobStoreError};
pub use types::{INVOICING_AT_SHIPPING, Job, JobId, JobStatus, JobWork, RetryPolicy};

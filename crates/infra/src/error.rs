//! Application-service errors.

use thiserror::Error;

use shipadvice_core::DomainError;

use crate::command_dispatcher::DispatchError;
use crate::jobs::JobStoreError;

#[derive(Debug, Error)]
pub enum ServiceError {
    /// Rejected by a service-level rule (e.g. routing key uniqueness).
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error(transparent)]
    Jobs(#[from] JobStoreError),
}

impl ServiceError {
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ServiceError::Domain(DomainError::Validation(_))
                | ServiceError::Dispatch(DispatchError::Validation(_))
        )
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::Domain(DomainError::NotFound)
                | ServiceError::Dispatch(DispatchError::NotFound)
        )
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

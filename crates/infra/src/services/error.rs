use thiserror::Error;

use stockledger_core::DomainError;

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStoreError;
use crate::import::RowError;
use crate::projections::ProjectionError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error returned by every service operation.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    /// Optimistic concurrency failure that outlived the dispatcher's retries.
    #[error("concurrent modification: {0}")]
    Conflict(String),
    #[error("event store error: {0}")]
    Store(EventStoreError),
    #[error("projection error: {0}")]
    Projection(#[from] ProjectionError),
    #[error("failed to deserialize stored event: {0}")]
    Deserialize(String),
    #[error("import rejected with {} row error(s)", .0.len())]
    Import(Vec<RowError>),
}

impl ServiceError {
    /// Concurrency conflicts can succeed when the whole operation is re-run.
    ///
    /// `DomainError::Conflict` (duplicate item or lot) is deterministic and is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ServiceError::Conflict(_))
    }
}

impl From<DispatchError> for ServiceError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Concurrency(msg) => ServiceError::Conflict(msg),
            DispatchError::Domain(e) => ServiceError::Domain(e),
            DispatchError::Deserialize(msg) => ServiceError::Deserialize(msg),
            DispatchError::Store(e) => ServiceError::Store(e),
        }
    }
}

impl From<EventStoreError> for ServiceError {
    fn from(value: EventStoreError) -> Self {
        match value {
            EventStoreError::Concurrency(msg) => ServiceError::Conflict(msg),
            other => ServiceError::Store(other),
        }
    }
}

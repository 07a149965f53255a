//! Error outcomes reported by the progress aggregator.
//!
//! Callers translate these into their own transport status; the aggregator
//! never retries and never swallows a failure.

use thiserror::Error;
use uuid::Uuid;

use crate::models::Role;

#[derive(Debug, Error)]
pub enum ProgressError {
    /// Unknown user, or a user that is not an intern where one is required.
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: Uuid },

    /// Role or ownership check failed.
    #[error("{role} {requester} may not access data of {target}")]
    AccessDenied {
        role: Role,
        requester: Uuid,
        target: String,
    },

    /// The data store could not be read.
    #[error("failed to retrieve progress data: {0}")]
    RetrievalFailure(String),

    /// Malformed input such as an unparseable date.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl ProgressError {
    pub fn retrieval(err: anyhow::Error) -> Self {
        ProgressError::RetrievalFailure(format!("{err:#}"))
    }
}

use thiserror::Error;

/// Errors surfaced by the job engine, mapped onto HTTP status classes by the
/// routes layer.
#[derive(Error, Debug)]
pub enum JobError {
    /// Malformed input; rejected before any side effect.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Requested compute nodes that do not exist in the inventory.
    #[error("unknown compute nodes: {}", .0.join(", "))]
    UnknownNodes(Vec<String>),

    /// Requested nodes already owned by another job.
    #[error("compute nodes already allocated: {}", .0.join(", "))]
    NodesAllocated(Vec<String>),

    /// No job for that external id.
    #[error("job {0} not found")]
    NotFound(String),

    /// The job exists but its current status forbids the operation.
    #[error("job {external_id} cannot {operation} from status {status}")]
    InvalidState {
        external_id: String,
        status: String,
        operation: &'static str,
    },

    /// Upstream or database failure; the job row records what happened.
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl JobError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

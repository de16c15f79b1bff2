//! Job admission, provisioning and teardown.

pub mod engine;
pub mod error;
pub mod models;
pub mod names;

pub use engine::{JobEngine, SubmitOutcome, SubmitRequest};
pub use error::JobError;
pub use models::{ComputeNodeAllocation, Job, JobStatus};

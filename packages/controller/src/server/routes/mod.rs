pub mod health;
pub mod jobs;

pub use health::health_handler;
pub use jobs::{
    cleanup_expired_handler, complete_job_handler, list_jobs_handler, submit_job_handler,
};

// Kernel - core infrastructure with dependency injection
//
// ServerDeps holds the infrastructure the domain layers run on (database,
// cache, fabric manager client, deploy batcher) behind traits for
// testability.
//
// IMPORTANT: Kernel is for INFRASTRUCTURE only, not business logic.
// Business logic belongs in domain layers.

pub mod cache;
pub mod deploy_batcher;
pub mod deps;
pub mod scheduled_tasks;
pub mod service_host;
pub mod sync;
pub mod test_dependencies;
pub mod traits;

pub use cache::ValkeyCache;
pub use deploy_batcher::DeployBatcher;
pub use deps::{NdfcFabricApi, ServerDeps};
pub use service_host::{Service, ServiceHost};
pub use sync::{SyncWorker, SyncWorkerConfig};
pub use traits::*;

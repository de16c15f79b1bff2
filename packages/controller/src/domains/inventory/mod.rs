//! Local mirror of the fabric-manager topology plus the compute nodes wired
//! into it. The fabric manager is the source of truth for fabrics, switches
//! and ports; this store is the source of truth for nodes, jobs and
//! allocations.

pub mod filters;
pub mod models;

pub use models::*;

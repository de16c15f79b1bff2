// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Business logic (like the provisioning pipeline) lives in domain functions
// that use these traits.
//
// Naming convention: Base* for trait names (e.g., BaseCache, BaseFabricApi)

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use ndfc::types::{
    Contract, ContractAssociation, NdFabric, NdInterface, NdLink, NdNetwork, NdSwitch,
    SecurityGroup, SecurityProtocol,
};

// =============================================================================
// Cache / lease trait (Infrastructure - Valkey)
// =============================================================================

/// Outcome of a lease acquisition attempt. Never blocks: a held lease is an
/// answer, not a wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseAcquisition {
    Acquired,
    AlreadyHeld,
}

#[async_trait]
pub trait BaseCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Delete keys matching a glob pattern via incremental scan. Returns the
    /// number of keys removed.
    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64>;

    /// Atomic compare-and-set on an absent key with TTL.
    async fn acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseAcquisition>;

    /// Refresh the TTL iff the stored holder still matches. Returns whether
    /// the lease was still ours.
    async fn extend_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool>;

    /// Delete the lease iff the stored holder still matches, so a late
    /// releaser can never free someone else's lease.
    async fn release_lease(&self, key: &str, holder: &str) -> Result<bool>;
}

// =============================================================================
// Fabric manager trait (Infrastructure - NDFC operations the core drives)
// =============================================================================

#[async_trait]
pub trait BaseFabricApi: Send + Sync {
    // Security objects
    async fn create_security_groups(&self, fabric: &str, groups: &[SecurityGroup]) -> Result<()>;

    async fn get_security_group_by_name(
        &self,
        fabric: &str,
        name: &str,
    ) -> Result<Option<SecurityGroup>>;

    async fn delete_security_group(&self, fabric: &str, group: &SecurityGroup) -> Result<()>;

    async fn create_contracts(&self, fabric: &str, contracts: &[Contract]) -> Result<()>;

    async fn delete_contract(&self, fabric: &str, name: &str) -> Result<()>;

    async fn create_contract_associations(
        &self,
        fabric: &str,
        associations: &[ContractAssociation],
    ) -> Result<()>;

    async fn delete_contract_association(
        &self,
        fabric: &str,
        association: &ContractAssociation,
    ) -> Result<()>;

    async fn list_protocols(&self, fabric: &str) -> Result<Vec<SecurityProtocol>>;

    async fn create_protocol(&self, fabric: &str, protocol: &SecurityProtocol) -> Result<()>;

    // Topology reads
    async fn get_fabric(&self, fabric: &str) -> Result<Option<NdFabric>>;

    async fn list_switches(&self, fabric: &str) -> Result<Vec<NdSwitch>>;

    async fn list_interfaces(&self, serial_number: &str) -> Result<Vec<NdInterface>>;

    async fn list_links(&self, fabric: &str) -> Result<Vec<NdLink>>;

    async fn get_network(&self, fabric: &str, network_name: &str) -> Result<Option<NdNetwork>>;

    // Deploy
    async fn deploy_config(&self, fabric: &str) -> Result<()>;
}

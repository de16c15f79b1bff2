//! Server dependencies (using traits for testability)
//!
//! This module provides the central dependency container used by the job
//! engine, the sync worker and the HTTP handlers. External services sit
//! behind trait abstractions so tests can swap in the mocks from
//! `test_dependencies`.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use ndfc::types::{
    Contract, ContractAssociation, NdFabric, NdInterface, NdLink, NdNetwork, NdSwitch,
    SecurityGroup, SecurityProtocol,
};
use ndfc::NdfcClient;
use sqlx::PgPool;

use crate::config::{FabricConfig, JobSettings};
use crate::kernel::deploy_batcher::DeployBatcher;
use crate::kernel::{BaseCache, BaseFabricApi};

// =============================================================================
// NdfcClient Adapter (implements BaseFabricApi trait)
// =============================================================================

/// Wrapper around the typed NDFC client that implements BaseFabricApi
pub struct NdfcFabricApi(pub Arc<NdfcClient>);

impl NdfcFabricApi {
    pub fn new(client: Arc<NdfcClient>) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BaseFabricApi for NdfcFabricApi {
    async fn create_security_groups(&self, fabric: &str, groups: &[SecurityGroup]) -> Result<()> {
        self.0.create_security_groups(fabric, groups).await?;
        Ok(())
    }

    async fn get_security_group_by_name(
        &self,
        fabric: &str,
        name: &str,
    ) -> Result<Option<SecurityGroup>> {
        Ok(self.0.get_security_group_by_name(fabric, name).await?)
    }

    async fn delete_security_group(&self, fabric: &str, group: &SecurityGroup) -> Result<()> {
        Ok(self.0.delete_security_group(fabric, group).await?)
    }

    async fn create_contracts(&self, fabric: &str, contracts: &[Contract]) -> Result<()> {
        self.0.create_contracts(fabric, contracts).await?;
        Ok(())
    }

    async fn delete_contract(&self, fabric: &str, name: &str) -> Result<()> {
        Ok(self.0.delete_contract(fabric, name).await?)
    }

    async fn create_contract_associations(
        &self,
        fabric: &str,
        associations: &[ContractAssociation],
    ) -> Result<()> {
        self.0.create_contract_associations(fabric, associations).await?;
        Ok(())
    }

    async fn delete_contract_association(
        &self,
        fabric: &str,
        association: &ContractAssociation,
    ) -> Result<()> {
        Ok(self.0.delete_contract_association(fabric, association).await?)
    }

    async fn list_protocols(&self, fabric: &str) -> Result<Vec<SecurityProtocol>> {
        Ok(self.0.list_protocols(fabric).await?)
    }

    async fn create_protocol(&self, fabric: &str, protocol: &SecurityProtocol) -> Result<()> {
        Ok(self.0.create_protocol(fabric, protocol).await?)
    }

    async fn get_fabric(&self, fabric: &str) -> Result<Option<NdFabric>> {
        Ok(self.0.get_fabric(fabric).await?)
    }

    async fn list_switches(&self, fabric: &str) -> Result<Vec<NdSwitch>> {
        Ok(self.0.list_switches(fabric).await?)
    }

    async fn list_interfaces(&self, serial_number: &str) -> Result<Vec<NdInterface>> {
        Ok(self.0.list_interfaces(serial_number).await?)
    }

    async fn list_links(&self, fabric: &str) -> Result<Vec<NdLink>> {
        Ok(self.0.list_links(fabric).await?)
    }

    async fn get_network(&self, fabric: &str, network_name: &str) -> Result<Option<NdNetwork>> {
        Ok(self.0.get_network(fabric, network_name).await?)
    }

    async fn deploy_config(&self, fabric: &str) -> Result<()> {
        Ok(self.0.deploy_config(fabric).await?)
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Server dependencies accessible to the engine and workers
#[derive(Clone)]
pub struct ServerDeps {
    pub db_pool: PgPool,
    pub cache: Arc<dyn BaseCache>,
    pub fabric: Arc<dyn BaseFabricApi>,
    pub deploy: Arc<DeployBatcher>,
    pub fabric_settings: FabricConfig,
    pub job_settings: JobSettings,
}

impl ServerDeps {
    pub fn new(
        db_pool: PgPool,
        cache: Arc<dyn BaseCache>,
        fabric: Arc<dyn BaseFabricApi>,
        deploy: Arc<DeployBatcher>,
        fabric_settings: FabricConfig,
        job_settings: JobSettings,
    ) -> Self {
        Self {
            db_pool,
            cache,
            fabric,
            deploy,
            fabric_settings,
            job_settings,
        }
    }
}

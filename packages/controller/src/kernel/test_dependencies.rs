// TestDependencies - mock implementations for testing
//
// Provides an in-memory cache and a scripted fabric manager that can be
// injected as ServerDeps for unit and integration tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use ndfc::error::NdfcError;
use ndfc::types::{
    Contract, ContractAssociation, NdFabric, NdInterface, NdLink, NdNetwork, NdSwitch,
    SecurityGroup, SecurityProtocol,
};

use super::traits::{BaseCache, BaseFabricApi, LeaseAcquisition};

// =============================================================================
// In-memory cache (honors TTLs and lease holder checks)
// =============================================================================

#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, (String, Option<Instant>)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_value(&self, key: &str) -> Option<String> {
        let mut entries = self.entries.lock().unwrap();
        match entries.get(key) {
            Some((_, Some(expiry))) if *expiry <= Instant::now() => {
                entries.remove(key);
                None
            }
            Some((value, _)) => Some(value.clone()),
            None => None,
        }
    }

    /// Test hook: drop a key regardless of holder.
    pub fn evict(&self, key: &str) {
        self.entries.lock().unwrap().remove(key);
    }
}

#[async_trait]
impl BaseCache for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.live_value(key))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        self.entries.lock().unwrap().insert(
            key.to_string(),
            (value.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.lock().unwrap().remove(key);
        Ok(())
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        // Glob subset: a single trailing '*' is all the workers use.
        let prefix = pattern.strip_suffix('*').unwrap_or(pattern);
        let mut entries = self.entries.lock().unwrap();
        let keys: Vec<String> = entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            entries.remove(key);
        }
        Ok(keys.len() as u64)
    }

    async fn acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseAcquisition> {
        if self.live_value(key).is_some() {
            return Ok(LeaseAcquisition::AlreadyHeld);
        }
        self.entries.lock().unwrap().insert(
            key.to_string(),
            (holder.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(LeaseAcquisition::Acquired)
    }

    async fn extend_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        if self.live_value(key).as_deref() != Some(holder) {
            return Ok(false);
        }
        self.entries.lock().unwrap().insert(
            key.to_string(),
            (holder.to_string(), Some(Instant::now() + ttl)),
        );
        Ok(true)
    }

    async fn release_lease(&self, key: &str, holder: &str) -> Result<bool> {
        if self.live_value(key).as_deref() != Some(holder) {
            return Ok(false);
        }
        self.entries.lock().unwrap().remove(key);
        Ok(true)
    }
}

// =============================================================================
// Scripted fabric manager
// =============================================================================

/// One call the mock observed, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum FabricCall {
    CreateGroups { fabric: String, names: Vec<String> },
    DeleteGroup { fabric: String, name: String },
    CreateContracts { fabric: String, names: Vec<String> },
    DeleteContract { fabric: String, name: String },
    CreateAssociations { fabric: String, contracts: Vec<String> },
    DeleteAssociation { fabric: String, contract: String },
    CreateProtocol { fabric: String, name: String },
    Deploy { fabric: String },
}

#[derive(Default)]
pub struct MockFabricApi {
    pub calls: Mutex<Vec<FabricCall>>,
    fail: Mutex<HashMap<String, (u16, String)>>,

    pub groups: Mutex<HashMap<String, SecurityGroup>>,
    pub contracts: Mutex<Vec<String>>,
    pub associations: Mutex<Vec<ContractAssociation>>,
    pub protocols: Mutex<Vec<SecurityProtocol>>,
    next_group_id: AtomicI64,

    pub switches: Mutex<Vec<NdSwitch>>,
    pub interfaces: Mutex<HashMap<String, Vec<NdInterface>>>,
    pub links: Mutex<Vec<NdLink>>,
    pub networks: Mutex<Vec<NdNetwork>>,

    pub deploy_calls: AtomicU32,
    pub interface_fetches: AtomicU32,
    pub link_fetches: AtomicU32,
}

impl MockFabricApi {
    pub fn new() -> Self {
        Self {
            next_group_id: AtomicI64::new(1),
            ..Default::default()
        }
    }

    /// Make `op` fail with an HTTP error until cleared.
    pub fn fail_op(&self, op: &str, status: u16, body: &str) {
        self.fail
            .lock()
            .unwrap()
            .insert(op.to_string(), (status, body.to_string()));
    }

    pub fn clear_failure(&self, op: &str) {
        self.fail.lock().unwrap().remove(op);
    }

    fn check(&self, op: &str, method: &str, path: &str) -> Result<()> {
        if let Some((status, body)) = self.fail.lock().unwrap().get(op) {
            return Err(NdfcError::http(method, path, *status, body).into());
        }
        Ok(())
    }

    fn record(&self, call: FabricCall) {
        self.calls.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<FabricCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_call(&self, predicate: impl Fn(&FabricCall) -> bool) -> bool {
        self.calls.lock().unwrap().iter().any(predicate)
    }

    fn group_key(fabric: &str, name: &str) -> String {
        format!("{}/{}", fabric, name)
    }
}

#[async_trait]
impl BaseFabricApi for MockFabricApi {
    async fn create_security_groups(&self, fabric: &str, groups: &[SecurityGroup]) -> Result<()> {
        self.record(FabricCall::CreateGroups {
            fabric: fabric.to_string(),
            names: groups.iter().map(|g| g.group_name.clone()).collect(),
        });
        self.check("create_security_groups", "POST", "/groups")?;
        let mut stored = self.groups.lock().unwrap();
        for group in groups {
            let mut group = group.clone();
            group.group_id = Some(self.next_group_id.fetch_add(1, Ordering::SeqCst));
            stored.insert(Self::group_key(fabric, &group.group_name), group);
        }
        Ok(())
    }

    async fn get_security_group_by_name(
        &self,
        fabric: &str,
        name: &str,
    ) -> Result<Option<SecurityGroup>> {
        self.check("get_security_group_by_name", "GET", "/groups")?;
        Ok(self
            .groups
            .lock()
            .unwrap()
            .get(&Self::group_key(fabric, name))
            .cloned())
    }

    async fn delete_security_group(&self, fabric: &str, group: &SecurityGroup) -> Result<()> {
        self.record(FabricCall::DeleteGroup {
            fabric: fabric.to_string(),
            name: group.group_name.clone(),
        });
        self.check("delete_security_group", "DELETE", "/groups")?;
        let removed = self
            .groups
            .lock()
            .unwrap()
            .remove(&Self::group_key(fabric, &group.group_name));
        if removed.is_none() {
            return Err(NdfcError::http("DELETE", "/groups", 404, "group not found").into());
        }
        Ok(())
    }

    async fn create_contracts(&self, fabric: &str, contracts: &[Contract]) -> Result<()> {
        self.record(FabricCall::CreateContracts {
            fabric: fabric.to_string(),
            names: contracts.iter().map(|c| c.contract_name.clone()).collect(),
        });
        self.check("create_contracts", "POST", "/contracts")?;
        let mut stored = self.contracts.lock().unwrap();
        for contract in contracts {
            stored.push(contract.contract_name.clone());
        }
        Ok(())
    }

    async fn delete_contract(&self, fabric: &str, name: &str) -> Result<()> {
        self.record(FabricCall::DeleteContract {
            fabric: fabric.to_string(),
            name: name.to_string(),
        });
        self.check("delete_contract", "DELETE", "/contracts")?;
        let mut stored = self.contracts.lock().unwrap();
        match stored.iter().position(|c| c == name) {
            Some(index) => {
                stored.remove(index);
                Ok(())
            }
            None => Err(NdfcError::http("DELETE", "/contracts", 404, "contract not found").into()),
        }
    }

    async fn create_contract_associations(
        &self,
        fabric: &str,
        associations: &[ContractAssociation],
    ) -> Result<()> {
        self.record(FabricCall::CreateAssociations {
            fabric: fabric.to_string(),
            contracts: associations.iter().map(|a| a.contract_name.clone()).collect(),
        });
        self.check("create_contract_associations", "POST", "/contractAssociations")?;
        self.associations.lock().unwrap().extend_from_slice(associations);
        Ok(())
    }

    async fn delete_contract_association(
        &self,
        fabric: &str,
        association: &ContractAssociation,
    ) -> Result<()> {
        self.record(FabricCall::DeleteAssociation {
            fabric: fabric.to_string(),
            contract: association.contract_name.clone(),
        });
        self.check("delete_contract_association", "DELETE", "/contractAssociations")?;
        let mut stored = self.associations.lock().unwrap();
        match stored
            .iter()
            .position(|a| a.contract_name == association.contract_name)
        {
            Some(index) => {
                stored.remove(index);
                Ok(())
            }
            None => Err(NdfcError::http(
                "DELETE",
                "/contractAssociations",
                404,
                "association not found",
            )
            .into()),
        }
    }

    async fn list_protocols(&self, _fabric: &str) -> Result<Vec<SecurityProtocol>> {
        self.check("list_protocols", "GET", "/protocols")?;
        Ok(self.protocols.lock().unwrap().clone())
    }

    async fn create_protocol(&self, fabric: &str, protocol: &SecurityProtocol) -> Result<()> {
        self.record(FabricCall::CreateProtocol {
            fabric: fabric.to_string(),
            name: protocol.protocol_name.clone(),
        });
        self.check("create_protocol", "POST", "/protocols")?;
        self.protocols.lock().unwrap().push(protocol.clone());
        Ok(())
    }

    async fn get_fabric(&self, fabric: &str) -> Result<Option<NdFabric>> {
        self.check("get_fabric", "GET", "/fabrics")?;
        Ok(Some(NdFabric {
            fabric_name: fabric.to_string(),
            fabric_type: Some("Switch_Fabric".to_string()),
            id: Some(1),
        }))
    }

    async fn list_switches(&self, _fabric: &str) -> Result<Vec<NdSwitch>> {
        self.check("list_switches", "GET", "/inventory")?;
        Ok(self.switches.lock().unwrap().clone())
    }

    async fn list_interfaces(&self, serial_number: &str) -> Result<Vec<NdInterface>> {
        self.interface_fetches.fetch_add(1, Ordering::SeqCst);
        self.check("list_interfaces", "GET", "/interface")?;
        Ok(self
            .interfaces
            .lock()
            .unwrap()
            .get(serial_number)
            .cloned()
            .unwrap_or_default())
    }

    async fn list_links(&self, _fabric: &str) -> Result<Vec<NdLink>> {
        self.link_fetches.fetch_add(1, Ordering::SeqCst);
        self.check("list_links", "GET", "/links")?;
        Ok(self.links.lock().unwrap().clone())
    }

    async fn get_network(&self, _fabric: &str, network_name: &str) -> Result<Option<NdNetwork>> {
        self.check("get_network", "GET", "/networks")?;
        Ok(self
            .networks
            .lock()
            .unwrap()
            .iter()
            .find(|n| n.network_name == network_name)
            .cloned())
    }

    async fn deploy_config(&self, fabric: &str) -> Result<()> {
        self.record(FabricCall::Deploy {
            fabric: fabric.to_string(),
        });
        self.deploy_calls.fetch_add(1, Ordering::SeqCst);
        self.check("deploy_config", "POST", "/config-deploy")?;
        Ok(())
    }
}

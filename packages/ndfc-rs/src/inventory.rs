//! LAN-fabric inventory reads: fabrics, switches, interfaces, links and
//! top-down networks.

use crate::error::NdfcError;
use crate::paths::{api_path, LAN_FABRIC_V1};
use crate::types::{NdFabric, NdInterface, NdLink, NdNetwork, NdSwitch};
use crate::NdfcClient;

impl NdfcClient {
    pub async fn list_fabrics(&self) -> Result<Vec<NdFabric>, NdfcError> {
        let path = api_path(LAN_FABRIC_V1, &["rest", "control", "fabrics"])?;
        self.get_json(&path, &[]).await
    }

    pub async fn get_fabric(&self, fabric: &str) -> Result<Option<NdFabric>, NdfcError> {
        let path = api_path(LAN_FABRIC_V1, &["rest", "control", "fabrics", fabric])?;
        match self.get_json::<NdFabric>(&path, &[]).await {
            Ok(found) => Ok(Some(found)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// All switches registered in a fabric, every role included; the caller
    /// filters to the roles it keeps.
    pub async fn list_switches(&self, fabric: &str) -> Result<Vec<NdSwitch>, NdfcError> {
        let path = api_path(
            LAN_FABRIC_V1,
            &["rest", "control", "fabrics", fabric, "inventory"],
        )?;
        self.get_json(&path, &[]).await
    }

    /// Physical interfaces of one switch, addressed by serial number.
    pub async fn list_interfaces(&self, serial_number: &str) -> Result<Vec<NdInterface>, NdfcError> {
        let path = api_path(LAN_FABRIC_V1, &["rest", "interface"])?;
        self.get_json(&path, &[("serialNumber", serial_number.to_string())])
            .await
    }

    /// Inter-switch links of a fabric, used to derive the uplink set.
    pub async fn list_links(&self, fabric: &str) -> Result<Vec<NdLink>, NdfcError> {
        let path = api_path(
            LAN_FABRIC_V1,
            &["rest", "control", "links", "fabrics", fabric],
        )?;
        self.get_json(&path, &[]).await
    }

    pub async fn list_networks(&self, fabric: &str) -> Result<Vec<NdNetwork>, NdfcError> {
        let path = api_path(
            LAN_FABRIC_V1,
            &["rest", "top-down", "fabrics", fabric, "networks"],
        )?;
        self.get_json(&path, &[]).await
    }

    pub async fn get_network(
        &self,
        fabric: &str,
        network_name: &str,
    ) -> Result<Option<NdNetwork>, NdfcError> {
        let networks = self.list_networks(fabric).await?;
        Ok(networks.into_iter().find(|n| n.network_name == network_name))
    }
}

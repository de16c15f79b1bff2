//! Wire types for the NDFC security and LAN-fabric APIs.
//!
//! Write payloads carry a `validate()` implementing the documented request
//! requirements, and a `sanitized()` that strips fields the server refuses
//! in a request body (it reads `fabric` from the path). Both run inside the
//! client before anything is sent.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::NdfcError;

// =============================================================================
// Security API payloads
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroup {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<i64>,
    pub group_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_type: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_selectors: Vec<IpSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_selectors: Vec<NetworkSelector>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub network_port_selectors: Vec<NetworkPortSelector>,
    /// Whether the group should be attached (deployed) on the fabric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach: Option<bool>,
    /// Populated in responses; the server reads the fabric from the URL path
    /// and rejects it in request bodies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpSelector {
    #[serde(rename = "type")]
    pub selector_type: String,
    pub vrf_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSelector {
    pub vrf_name: String,
    pub network_name: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkPortSelector {
    #[serde(rename = "switchSerialNumber")]
    pub switch_serial: String,
    #[serde(rename = "interfaceName")]
    pub interface: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vlan_id: Option<u16>,
}

impl SecurityGroup {
    pub fn validate(&self) -> Result<(), NdfcError> {
        if self.group_name.trim().is_empty() {
            return Err(NdfcError::Validation("security group requires groupName".into()));
        }
        for selector in &self.ip_selectors {
            if selector.selector_type.trim().is_empty() {
                return Err(NdfcError::Validation(format!(
                    "group {}: ip selector requires type",
                    self.group_name
                )));
            }
            if selector.vrf_name.trim().is_empty() {
                return Err(NdfcError::Validation(format!(
                    "group {}: ip selector requires vrfName",
                    self.group_name
                )));
            }
        }
        Ok(())
    }

    pub fn sanitized(mut self) -> Self {
        self.fabric = None;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    pub contract_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<ContractRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractRule {
    /// `bidirectional` or `unidirectional`.
    pub direction: String,
    /// `permit` or `deny`.
    pub action: String,
    pub protocol_name: String,
}

impl Contract {
    pub fn validate(&self) -> Result<(), NdfcError> {
        if self.contract_name.trim().is_empty() {
            return Err(NdfcError::Validation("contract requires contractName".into()));
        }
        for rule in &self.rules {
            if rule.direction.trim().is_empty() || rule.action.trim().is_empty() {
                return Err(NdfcError::Validation(format!(
                    "contract {}: every rule requires direction and action",
                    self.contract_name
                )));
            }
        }
        Ok(())
    }

    pub fn sanitized(mut self) -> Self {
        self.fabric = None;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractAssociation {
    pub vrf_name: String,
    pub contract_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub src_group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dst_group_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric: Option<String>,
}

impl ContractAssociation {
    pub fn validate(&self) -> Result<(), NdfcError> {
        if self.vrf_name.trim().is_empty() {
            return Err(NdfcError::Validation("contract association requires vrfName".into()));
        }
        if self.contract_name.trim().is_empty() {
            return Err(NdfcError::Validation(
                "contract association requires contractName".into(),
            ));
        }
        let src_ok = self.src_group_name.as_deref().is_some_and(|n| !n.trim().is_empty())
            || self.src_group_id.is_some_and(|id| id > 0);
        if !src_ok {
            return Err(NdfcError::Validation(
                "contract association requires srcGroupName or a positive srcGroupId".into(),
            ));
        }
        let dst_ok = self.dst_group_name.as_deref().is_some_and(|n| !n.trim().is_empty())
            || self.dst_group_id.is_some_and(|id| id > 0);
        if !dst_ok {
            return Err(NdfcError::Validation(
                "contract association requires dstGroupName or a positive dstGroupId".into(),
            ));
        }
        Ok(())
    }

    pub fn sanitized(mut self) -> Self {
        self.fabric = None;
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityProtocol {
    pub protocol_name: String,
    pub match_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fabric: Option<String>,
}

impl SecurityProtocol {
    pub fn validate(&self) -> Result<(), NdfcError> {
        if self.protocol_name.trim().is_empty() {
            return Err(NdfcError::Validation("protocol requires protocolName".into()));
        }
        if self.match_type.trim().is_empty() {
            return Err(NdfcError::Validation("protocol requires matchType".into()));
        }
        Ok(())
    }

    pub fn sanitized(mut self) -> Self {
        self.fabric = None;
        self
    }
}

// =============================================================================
// Batch response envelope
// =============================================================================

/// Response shape shared by the batch create/update endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResponse {
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub success: u32,
    #[serde(default)]
    pub failed: u32,
    /// NDFC reports this as either a string or a number.
    #[serde(default, deserialize_with = "de_flexible_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub success_list: Vec<serde_json::Value>,
    #[serde(default)]
    pub failure_list: Vec<BatchFailureItem>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFailureItem {
    #[serde(default, alias = "groupName", alias = "contractName")]
    pub name: Option<String>,
    #[serde(default, alias = "groupId")]
    pub id: Option<i64>,
    #[serde(default, deserialize_with = "de_flexible_string")]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

fn de_flexible_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        Some(other) => Some(other.to_string()),
    })
}

// =============================================================================
// LAN-fabric inventory responses
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdFabric {
    pub fabric_name: String,
    #[serde(default)]
    pub fabric_type: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NdSwitch {
    #[serde(rename = "logicalName", default)]
    pub name: Option<String>,
    #[serde(rename = "serialNumber", default)]
    pub serial_number: Option<String>,
    #[serde(rename = "model", default)]
    pub model: Option<String>,
    #[serde(rename = "ipAddress", default)]
    pub ip: Option<String>,
    #[serde(rename = "switchRole", default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NdInterface {
    #[serde(rename = "ifName", default)]
    pub if_name: Option<String>,
    #[serde(rename = "description", default)]
    pub description: Option<String>,
    #[serde(rename = "adminStatus", default)]
    pub admin_status: Option<String>,
    #[serde(rename = "speed", default, deserialize_with = "de_flexible_string")]
    pub speed: Option<String>,
}

/// One end of an inter-switch link.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NdLinkEnd {
    #[serde(rename = "sw-serial-number", default)]
    pub serial_number: Option<String>,
    #[serde(rename = "if-name", default)]
    pub if_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NdLink {
    #[serde(rename = "sw1-info", default)]
    pub switch1: Option<NdLinkEnd>,
    #[serde(rename = "sw2-info", default)]
    pub switch2: Option<NdLinkEnd>,
}

impl NdLink {
    /// `"<serial>:<ifname>"` keys for both ends, for uplink exclusion.
    pub fn endpoint_keys(&self) -> impl Iterator<Item = String> + '_ {
        [self.switch1.as_ref(), self.switch2.as_ref()]
            .into_iter()
            .flatten()
            .filter_map(|end| match (&end.serial_number, &end.if_name) {
                (Some(serial), Some(if_name)) => Some(format!("{}:{}", serial, if_name)),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdNetwork {
    pub network_name: String,
    #[serde(default)]
    pub vrf: Option<String>,
    /// Stringified JSON blob holding, among other things, the VLAN id.
    #[serde(default)]
    pub network_template_config: Option<String>,
}

impl NdNetwork {
    /// Extract the VLAN id from the embedded template config.
    ///
    /// Accepts a JSON number (integral only) or a numeric string; anything
    /// else present under `vlanId` is an error rather than a silent skip.
    pub fn vlan_id(&self) -> Result<Option<u16>, NdfcError> {
        let Some(config) = &self.network_template_config else {
            return Ok(None);
        };
        let parsed: serde_json::Value = serde_json::from_str(config).map_err(|source| {
            NdfcError::Validation(format!(
                "network {}: template config is not valid JSON: {}",
                self.network_name, source
            ))
        })?;
        match parsed.get("vlanId") {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(serde_json::Value::Number(n)) => n
                .as_u64()
                .and_then(|v| u16::try_from(v).ok())
                .map(Some)
                .ok_or_else(|| {
                    NdfcError::Validation(format!(
                        "network {}: vlanId {} is not a valid VLAN",
                        self.network_name, n
                    ))
                }),
            Some(serde_json::Value::String(s)) => s.trim().parse::<u16>().map(Some).map_err(|_| {
                NdfcError::Validation(format!(
                    "network {}: vlanId {:?} is not a valid VLAN",
                    self.network_name, s
                ))
            }),
            Some(other) => Err(NdfcError::Validation(format!(
                "network {}: vlanId has unexpected type: {}",
                self.network_name, other
            ))),
        }
    }
}

// =============================================================================
// Login
// =============================================================================

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "userName")]
    pub user_name: &'a str,
    #[serde(rename = "userPasswd")]
    pub user_passwd: &'a str,
    pub domain: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct LoginResponse {
    pub token: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_validation() {
        let group = SecurityGroup {
            group_name: "sg_e42".into(),
            ..Default::default()
        };
        assert!(group.validate().is_ok());

        let group = SecurityGroup::default();
        assert!(group.validate().is_err());

        let group = SecurityGroup {
            group_name: "sg_e42".into(),
            ip_selectors: vec![IpSelector {
                selector_type: "ip".into(),
                vrf_name: "".into(),
                ip: Some("10.0.0.1/32".into()),
            }],
            ..Default::default()
        };
        assert!(group.validate().is_err());
    }

    #[test]
    fn association_requires_both_endpoints() {
        let base = ContractAssociation {
            vrf_name: "vrf1".into(),
            contract_name: "c1".into(),
            ..Default::default()
        };
        assert!(base.validate().is_err());

        let assoc = ContractAssociation {
            src_group_name: Some("sg_a".into()),
            dst_group_id: Some(7),
            ..base.clone()
        };
        assert!(assoc.validate().is_ok());

        // Zero is not a valid group id.
        let assoc = ContractAssociation {
            src_group_id: Some(0),
            dst_group_name: Some("sg_b".into()),
            ..base
        };
        assert!(assoc.validate().is_err());
    }

    #[test]
    fn sanitize_strips_fabric() {
        let group = SecurityGroup {
            group_name: "sg".into(),
            fabric: Some("compute".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(group.sanitized()).unwrap();
        assert!(json.get("fabric").is_none());
    }

    #[test]
    fn batch_response_decodes_numeric_code() {
        let resp: BatchResponse = serde_json::from_str(
            r#"{"total": 2, "success": 1, "failed": 1, "code": 500,
                "failureList": [{"name": "sg_x", "code": "409", "message": "exists"}]}"#,
        )
        .unwrap();
        assert_eq!(resp.code.as_deref(), Some("500"));
        assert_eq!(resp.failure_list[0].code.as_deref(), Some("409"));
    }

    #[test]
    fn vlan_parsing_accepts_number_and_string() {
        let mut network = NdNetwork {
            network_name: "net1".into(),
            vrf: None,
            network_template_config: Some(r#"{"vlanId": 200}"#.into()),
        };
        assert_eq!(network.vlan_id().unwrap(), Some(200));

        network.network_template_config = Some(r#"{"vlanId": "200"}"#.into());
        assert_eq!(network.vlan_id().unwrap(), Some(200));

        network.network_template_config = Some(r#"{"vlanId": 200.5}"#.into());
        assert!(network.vlan_id().is_err());

        network.network_template_config = Some(r#"{"name": "x"}"#.into());
        assert_eq!(network.vlan_id().unwrap(), None);

        network.network_template_config = None;
        assert_eq!(network.vlan_id().unwrap(), None);
    }

    #[test]
    fn link_endpoint_keys() {
        let link: NdLink = serde_json::from_str(
            r#"{"sw1-info": {"sw-serial-number": "ABC", "if-name": "Ethernet1/49"},
                "sw2-info": {"sw-serial-number": "DEF", "if-name": "Ethernet1/50"}}"#,
        )
        .unwrap();
        let keys: Vec<String> = link.endpoint_keys().collect();
        assert_eq!(keys, vec!["ABC:Ethernet1/49", "DEF:Ethernet1/50"]);
    }
}

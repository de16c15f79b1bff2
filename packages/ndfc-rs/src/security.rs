//! Security API operations: groups, contracts, contract associations and
//! protocols.
//!
//! The create/update endpoints are batch endpoints. Their `{total, success,
//! failed, code, message, successList, failureList}` envelope is decoded by
//! [`decode_batch`]: the success list is only handed back when nothing
//! failed AND the response code reads as success; anything else becomes a
//! [`BatchError`] that distinguishes partial from total failure and keeps
//! the first per-item diagnostic.

use tracing::{debug, warn};

use crate::error::{BatchError, BatchFailure, NdfcError};
use crate::paths::{api_path, SECURITY_V1};
use crate::types::{
    BatchResponse, Contract, ContractAssociation, SecurityGroup, SecurityProtocol,
};
use crate::NdfcClient;

fn code_is_success(code: Option<&str>) -> bool {
    match code {
        None => true,
        Some(code) => {
            let code = code.trim().to_ascii_lowercase();
            code.is_empty() || code == "success" || code == "ok"
        }
    }
}

/// Turn a batch envelope into either the success list or a [`BatchError`].
pub fn decode_batch(
    op: &str,
    fabric: &str,
    response: BatchResponse,
) -> Result<Vec<serde_json::Value>, NdfcError> {
    if response.failed == 0 && code_is_success(response.code.as_deref()) {
        return Ok(response.success_list);
    }

    let failures = response
        .failure_list
        .into_iter()
        .map(|item| BatchFailure {
            name: item.name,
            id: item.id,
            code: item.code,
            message: item.message,
        })
        .collect();

    Err(NdfcError::Batch(BatchError {
        op: op.to_string(),
        fabric: fabric.to_string(),
        failed: response.failed,
        total: response.total,
        code: response.code,
        message: response.message,
        failures,
    }))
}

impl NdfcClient {
    // =========================================================================
    // Security groups
    // =========================================================================

    pub async fn create_security_groups(
        &self,
        fabric: &str,
        groups: &[SecurityGroup],
    ) -> Result<Vec<serde_json::Value>, NdfcError> {
        let payload = self.group_batch_payload(groups)?;
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "groups"])?;
        let response: BatchResponse = self.post_json(&path, &payload).await?;
        decode_batch("create security groups", fabric, response)
    }

    pub async fn update_security_groups(
        &self,
        fabric: &str,
        groups: &[SecurityGroup],
    ) -> Result<Vec<serde_json::Value>, NdfcError> {
        let payload = self.group_batch_payload(groups)?;
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "groups"])?;
        let response: BatchResponse = self.put_json(&path, &payload).await?;
        decode_batch("update security groups", fabric, response)
    }

    fn group_batch_payload(
        &self,
        groups: &[SecurityGroup],
    ) -> Result<serde_json::Value, NdfcError> {
        let mut sanitized = Vec::with_capacity(groups.len());
        for group in groups {
            group.validate()?;
            sanitized.push(group.clone().sanitized());
        }
        serde_json::to_value(sanitized).map_err(|source| NdfcError::Decode {
            path: "groups payload".into(),
            source,
        })
    }

    pub async fn list_security_groups(
        &self,
        fabric: &str,
    ) -> Result<Vec<SecurityGroup>, NdfcError> {
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "groups"])?;
        self.get_json(&path, &[]).await
    }

    /// Look up one group by name.
    ///
    /// Prefers `GET .../groups/{name}` where a 404 means "absent". Servers
    /// that do not route the by-name variant answer 400/405; those fall back
    /// to list-and-filter so callers never have to know which strategy ran.
    pub async fn get_security_group_by_name(
        &self,
        fabric: &str,
        name: &str,
    ) -> Result<Option<SecurityGroup>, NdfcError> {
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "groups", name])?;
        match self.get_json::<SecurityGroup>(&path, &[]).await {
            Ok(group) => Ok(Some(group)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) if matches!(err.status(), Some(400) | Some(405)) => {
                debug!(fabric = %fabric, name = %name, "by-name group lookup unsupported, listing");
                let groups = self.list_security_groups(fabric).await?;
                Ok(groups.into_iter().find(|g| g.group_name == name))
            }
            Err(err) => Err(err),
        }
    }

    /// Delete a group, detaching it first.
    ///
    /// The detach (an update with `attach=false`) is best-effort: servers
    /// refuse to delete an attached group, but a failed detach on an already
    /// detached group must not fail the delete.
    pub async fn delete_security_group(
        &self,
        fabric: &str,
        group: &SecurityGroup,
    ) -> Result<(), NdfcError> {
        let group_id = group.group_id.ok_or_else(|| {
            NdfcError::Validation(format!(
                "cannot delete group {} without a groupId",
                group.group_name
            ))
        })?;

        let mut detached = group.clone();
        detached.attach = Some(false);
        if let Err(err) = self.update_security_groups(fabric, &[detached]).await {
            warn!(
                fabric = %fabric,
                group = %group.group_name,
                error = %err,
                "detach before delete failed, deleting anyway"
            );
        }

        let path = api_path(SECURITY_V1, &["fabrics", fabric, "groups"])?;
        self.delete(&path, &[("groupId", group_id.to_string())]).await
    }

    // =========================================================================
    // Contracts
    // =========================================================================

    pub async fn create_contracts(
        &self,
        fabric: &str,
        contracts: &[Contract],
    ) -> Result<Vec<serde_json::Value>, NdfcError> {
        let mut sanitized = Vec::with_capacity(contracts.len());
        for contract in contracts {
            contract.validate()?;
            sanitized.push(contract.clone().sanitized());
        }
        let payload = serde_json::to_value(sanitized).map_err(|source| NdfcError::Decode {
            path: "contracts payload".into(),
            source,
        })?;

        let path = api_path(SECURITY_V1, &["fabrics", fabric, "contracts"])?;
        let response: BatchResponse = self.post_json(&path, &payload).await?;
        decode_batch("create contracts", fabric, response)
    }

    pub async fn list_contracts(&self, fabric: &str) -> Result<Vec<Contract>, NdfcError> {
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "contracts"])?;
        self.get_json(&path, &[]).await
    }

    pub async fn delete_contract(&self, fabric: &str, name: &str) -> Result<(), NdfcError> {
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "contracts"])?;
        self.delete(&path, &[("contractName", name.to_string())]).await
    }

    // =========================================================================
    // Contract associations
    // =========================================================================

    pub async fn create_contract_associations(
        &self,
        fabric: &str,
        associations: &[ContractAssociation],
    ) -> Result<Vec<serde_json::Value>, NdfcError> {
        let mut sanitized = Vec::with_capacity(associations.len());
        for association in associations {
            association.validate()?;
            sanitized.push(association.clone().sanitized());
        }
        let payload = serde_json::to_value(sanitized).map_err(|source| NdfcError::Decode {
            path: "contractAssociations payload".into(),
            source,
        })?;

        let path = api_path(SECURITY_V1, &["fabrics", fabric, "contractAssociations"])?;
        let response: BatchResponse = self.post_json(&path, &payload).await?;
        decode_batch("create contract associations", fabric, response)
    }

    pub async fn list_contract_associations(
        &self,
        fabric: &str,
    ) -> Result<Vec<ContractAssociation>, NdfcError> {
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "contractAssociations"])?;
        self.get_json(&path, &[]).await
    }

    pub async fn delete_contract_association(
        &self,
        fabric: &str,
        association: &ContractAssociation,
    ) -> Result<(), NdfcError> {
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "contractAssociations"])?;
        let query = [
            ("vrfName", association.vrf_name.clone()),
            (
                "srcGroupId",
                association.src_group_id.unwrap_or_default().to_string(),
            ),
            (
                "dstGroupId",
                association.dst_group_id.unwrap_or_default().to_string(),
            ),
            ("contractName", association.contract_name.clone()),
        ];
        self.delete(&path, &query).await
    }

    // =========================================================================
    // Protocols
    // =========================================================================

    pub async fn list_protocols(&self, fabric: &str) -> Result<Vec<SecurityProtocol>, NdfcError> {
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "protocols"])?;
        self.get_json(&path, &[]).await
    }

    pub async fn create_protocol(
        &self,
        fabric: &str,
        protocol: &SecurityProtocol,
    ) -> Result<(), NdfcError> {
        protocol.validate()?;
        let payload =
            serde_json::to_value(protocol.clone().sanitized()).map_err(|source| {
                NdfcError::Decode {
                    path: "protocol payload".into(),
                    source,
                }
            })?;
        let path = api_path(SECURITY_V1, &["fabrics", fabric, "protocols"])?;
        let _: serde_json::Value = self.post_json(&path, &payload).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BatchFailureItem;

    fn ok_response(n: u32) -> BatchResponse {
        BatchResponse {
            total: n,
            success: n,
            failed: 0,
            code: None,
            message: None,
            success_list: (0..n).map(|i| serde_json::json!({ "i": i })).collect(),
            failure_list: vec![],
        }
    }

    #[test]
    fn batch_success_returns_list() {
        let out = decode_batch("create security groups", "compute", ok_response(2)).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn batch_success_codes_accepted() {
        for code in [None, Some("success"), Some("SUCCESS"), Some("ok"), Some("")] {
            let mut resp = ok_response(1);
            resp.code = code.map(String::from);
            assert!(
                decode_batch("op", "f", resp).is_ok(),
                "code {:?} should be success",
                code
            );
        }
    }

    #[test]
    fn batch_failure_code_with_zero_failed_is_error() {
        let mut resp = ok_response(1);
        resp.code = Some("500".into());
        resp.message = Some("internal".into());
        let err = decode_batch("create contracts", "compute", resp).unwrap_err();
        match err {
            NdfcError::Batch(batch) => {
                assert_eq!(batch.op, "create contracts");
                assert_eq!(batch.code.as_deref(), Some("500"));
            }
            other => panic!("expected batch error, got {:?}", other),
        }
    }

    #[test]
    fn batch_partial_failure_preserves_diagnostics() {
        let resp = BatchResponse {
            total: 3,
            success: 2,
            failed: 1,
            code: Some("500".into()),
            message: Some("partial".into()),
            success_list: vec![serde_json::json!({}), serde_json::json!({})],
            failure_list: vec![BatchFailureItem {
                name: Some("sg_e42".into()),
                id: Some(17),
                code: Some("409".into()),
                message: Some("duplicate".into()),
            }],
        };
        let err = decode_batch("create security groups", "compute", resp).unwrap_err();
        match err {
            NdfcError::Batch(batch) => {
                assert!(batch.is_partial());
                assert!(!batch.is_total());
                assert_eq!(batch.failures[0].name.as_deref(), Some("sg_e42"));
                assert_eq!(batch.failures[0].id, Some(17));
            }
            other => panic!("expected batch error, got {:?}", other),
        }
    }
}

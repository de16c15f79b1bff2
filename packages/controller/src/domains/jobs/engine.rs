//! Provisioning and deprovisioning pipelines.
//!
//! ```text
//! submit (provision)
//!     │ validate → idempotent replay? → resolve nodes → resolve ports
//!     │ derive names → TXN [job row + job nodes + exclusive allocations]
//!     └─► security group → contract → contract association → deploy
//!            (ordered; failure compensates in reverse, best-effort)
//!
//! complete (deprovision)
//!     └─► association → contract → group (reverse order, not-found absorbed)
//!            → deploy → release allocations → completed
//! ```
//!
//! The upstream portion of a submit runs under the configured outer deadline.
//! A deploy failure leaves the security objects and allocations in place
//! (`cleanup_failed`) for the sweeper or a manual complete to reconcile.

use std::collections::{HashMap, HashSet};

use anyhow::Context;
use chrono::Utc;
use ndfc::error::{error_is_conflict, error_is_not_found};
use ndfc::types::{
    Contract, ContractAssociation, ContractRule, NetworkPortSelector, SecurityGroup,
    SecurityProtocol,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domains::inventory::{ComputeNode, NodePortPath};
use crate::kernel::deps::ServerDeps;

use super::error::JobError;
use super::models::{AllocationError, ComputeNodeAllocation, Job, JobStatus};
use super::names;

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitRequest {
    pub external_id: String,
    pub name: String,
    pub compute_nodes: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct SubmitOutcome {
    pub job: Job,
    pub created: bool,
}

#[derive(Clone)]
pub struct JobEngine {
    deps: ServerDeps,
}

impl JobEngine {
    pub fn new(deps: ServerDeps) -> Self {
        Self { deps }
    }

    // =========================================================================
    // Submit (provision)
    // =========================================================================

    pub async fn submit(&self, request: SubmitRequest) -> Result<SubmitOutcome, JobError> {
        validate_submit(&request)?;

        // Idempotent replay: an existing job is returned as-is, with no
        // upstream calls.
        if let Some(existing) =
            Job::find_by_external_id(&request.external_id, &self.deps.db_pool)
                .await
                .map_err(JobError::internal)?
        {
            info!(external_id = %request.external_id, "job already exists, replaying");
            return Ok(SubmitOutcome {
                job: existing,
                created: false,
            });
        }

        // Resolve every named node; a single unknown name rejects the whole
        // submission before any write.
        let nodes = ComputeNode::find_by_names(&request.compute_nodes, &self.deps.db_pool)
            .await
            .map_err(JobError::internal)?;
        if nodes.len() != request.compute_nodes.len() {
            let known: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
            let missing = request
                .compute_nodes
                .iter()
                .filter(|name| !known.contains(name.as_str()))
                .cloned()
                .collect();
            return Err(JobError::UnknownNodes(missing));
        }
        let node_ids: Vec<Uuid> = nodes.iter().map(|n| n.id).collect();

        // Resolve switch ports up front (pure reads), so a node without
        // cabling rejects the submission side-effect free.
        let paths = ComputeNode::port_paths(&node_ids, &self.deps.db_pool)
            .await
            .map_err(JobError::internal)?;
        let mut per_node: HashMap<Uuid, usize> = HashMap::new();
        for path in &paths {
            *per_node.entry(path.node_id).or_default() += 1;
        }
        if let Some(unwired) = nodes.iter().find(|n| !per_node.contains_key(&n.id)) {
            return Err(JobError::Validation(format!(
                "compute node {} has no switch-port mappings",
                unwired.name
            )));
        }

        let settings = &self.deps.fabric_settings;

        // The configured compute network must exist upstream; its VLAN wins
        // over the configured default when it carries one. An unreachable
        // fabric manager is not a validation failure, the pipeline itself
        // will surface it.
        let access_vlan = match self
            .deps
            .fabric
            .get_network(&settings.fabric_name, &settings.network_name)
            .await
        {
            Ok(Some(network)) => match network.vlan_id() {
                Ok(Some(vlan)) => vlan,
                Ok(None) => settings.access_vlan,
                Err(err) => {
                    warn!(network = %settings.network_name, error = %err, "unusable network VLAN, using configured default");
                    settings.access_vlan
                }
            },
            Ok(None) => {
                return Err(JobError::Validation(format!(
                    "network {} not found in fabric {}",
                    settings.network_name, settings.fabric_name
                )));
            }
            Err(err) => {
                warn!(error = %format!("{:#}", err), "network lookup failed, continuing with configured VLAN");
                settings.access_vlan
            }
        };

        let submitted_at = Utc::now();
        let job_row = Job {
            id: Uuid::new_v4(),
            external_id: request.external_id.clone(),
            name: request.name.clone(),
            status: JobStatus::Pending.as_str().to_string(),
            fabric: settings.fabric_name.clone(),
            vrf: settings.vrf_name.clone(),
            contract_name: names::contract_name(&settings.contract_prefix, &request.external_id),
            security_group_name: names::group_name(&request.external_id),
            security_group_id: None,
            submitted_at,
            provisioned_at: None,
            completed_at: None,
            expires_at: Some(submitted_at + self.deps.job_settings.default_ttl),
            error: None,
        };

        // Admission transaction: job row, its node list, and one allocation
        // per node. A contended node fails the allocation insert and rolls
        // everything back; nothing partial survives.
        let mut tx = self.deps.db_pool.begin().await.map_err(JobError::internal)?;
        let job = match job_row.insert(&mut tx).await {
            Ok(job) => job,
            Err(err) => {
                drop(tx);
                // Concurrent replay of the same external_id: the loser of
                // the insert race answers like any other replay.
                if is_unique_violation(&err) {
                    if let Ok(Some(existing)) =
                        Job::find_by_external_id(&request.external_id, &self.deps.db_pool).await
                    {
                        return Ok(SubmitOutcome {
                            job: existing,
                            created: false,
                        });
                    }
                }
                return Err(JobError::internal(err));
            }
        };
        Job::add_compute_nodes(job.id, &node_ids, &mut tx)
            .await
            .map_err(JobError::internal)?;
        match ComputeNodeAllocation::allocate_all(job.id, &node_ids, &mut tx).await {
            Ok(()) => tx.commit().await.map_err(JobError::internal)?,
            Err(AllocationError::Conflict) => {
                drop(tx);
                let contended =
                    ComputeNodeAllocation::allocated_names(&node_ids, &self.deps.db_pool)
                        .await
                        .unwrap_or_default();
                return Err(JobError::NodesAllocated(contended));
            }
            Err(AllocationError::Database(err)) => {
                drop(tx);
                return Err(JobError::internal(err));
            }
        }

        let job = Job::set_status(job.id, JobStatus::Provisioning, None, &self.deps.db_pool)
            .await
            .map_err(JobError::internal)?;
        info!(
            external_id = %job.external_id,
            nodes = node_ids.len(),
            group = %job.security_group_name,
            contract = %job.contract_name,
            "provisioning job"
        );

        let timeout = self.deps.job_settings.provision_timeout;
        match tokio::time::timeout(timeout, self.provision_upstream(&job, &paths, access_vlan)).await
        {
            Ok(result) => result.map(|job| SubmitOutcome { job, created: true }),
            Err(_) => {
                // Deadline hit mid-pipeline. Whatever was created upstream
                // stays for the sweeper or a manual complete; the job itself
                // fails and must hold no allocations.
                warn!(external_id = %job.external_id, "provisioning deadline exceeded");
                let message = format!("provisioning deadline of {:?} exceeded", timeout);
                self.mark_failed_released(&job, &message).await;
                Err(JobError::Internal(anyhow::anyhow!(message)))
            }
        }
    }

    /// Steps 7-10: the strictly ordered upstream pipeline.
    async fn provision_upstream(
        &self,
        job: &Job,
        paths: &[NodePortPath],
        access_vlan: u16,
    ) -> Result<Job, JobError> {
        let fabric = &job.fabric;

        let selectors: Vec<NetworkPortSelector> = paths
            .iter()
            .map(|path| NetworkPortSelector {
                switch_serial: path.switch_serial.clone(),
                interface: path.interface_name.clone(),
                vlan_id: Some(access_vlan),
            })
            .collect();
        let group = SecurityGroup {
            group_name: job.security_group_name.clone(),
            attach: Some(true),
            network_port_selectors: selectors,
            ..Default::default()
        };

        if let Err(err) = self.deps.fabric.create_security_groups(fabric, &[group]).await {
            return self
                .fail_provision(job, None, None, "creating security group", err)
                .await;
        }

        // The batch response does not echo ids; fetch the group back for the
        // association endpoints and for teardown.
        let created_group = match self
            .deps
            .fabric
            .get_security_group_by_name(fabric, &job.security_group_name)
            .await
        {
            Ok(Some(found)) => found,
            Ok(None) => {
                let err = anyhow::anyhow!(
                    "security group {} missing after create",
                    job.security_group_name
                );
                return self
                    .fail_provision(job, None, None, "resolving created security group", err)
                    .await;
            }
            Err(err) => {
                return self
                    .fail_provision(job, None, None, "resolving created security group", err)
                    .await;
            }
        };

        let protocol_name = match self.resolve_protocol(fabric).await {
            Ok(name) => name,
            Err(err) => {
                return self
                    .fail_provision(job, Some(&created_group), None, "resolving protocol", err)
                    .await;
            }
        };
        let contract = Contract {
            contract_name: job.contract_name.clone(),
            description: Some(format!("compute job {}", job.external_id)),
            rules: vec![ContractRule {
                direction: "bidirectional".to_string(),
                action: "permit".to_string(),
                protocol_name,
            }],
            fabric: None,
        };
        if let Err(err) = self.deps.fabric.create_contracts(fabric, &[contract]).await {
            // An existing contract with this name is "ensured", not failed.
            if !error_is_conflict(&err) {
                return self
                    .fail_provision(job, Some(&created_group), None, "creating contract", err)
                    .await;
            }
        }

        let association = ContractAssociation {
            vrf_name: job.vrf.clone(),
            contract_name: job.contract_name.clone(),
            src_group_name: Some(created_group.group_name.clone()),
            src_group_id: created_group.group_id,
            dst_group_name: Some(created_group.group_name.clone()),
            dst_group_id: created_group.group_id,
            fabric: None,
        };
        if let Err(err) = self
            .deps
            .fabric
            .create_contract_associations(fabric, &[association])
            .await
        {
            return self
                .fail_provision(
                    job,
                    Some(&created_group),
                    Some(&job.contract_name),
                    "creating contract association",
                    err,
                )
                .await;
        }

        match self.deps.deploy.request_deploy(fabric).await {
            Ok(()) => {
                let job = Job::mark_active(
                    job.id,
                    created_group.group_id.unwrap_or_default(),
                    &self.deps.db_pool,
                )
                .await
                .map_err(JobError::internal)?;
                info!(external_id = %job.external_id, "job active");
                Ok(job)
            }
            Err(err) => {
                // Security objects and allocations stay for reconciliation.
                let message = format!("{:#}", err);
                warn!(external_id = %job.external_id, error = %message, "deploy failed, job needs cleanup");
                Job::mark_cleanup_failed(
                    job.id,
                    created_group.group_id,
                    &message,
                    &self.deps.db_pool,
                )
                .await
                .map_err(JobError::internal)?;
                Err(JobError::Internal(err.context("deploying configuration")))
            }
        }
    }

    /// Compensate in reverse creation order (best-effort), fail the job, and
    /// release its allocations.
    async fn fail_provision(
        &self,
        job: &Job,
        group: Option<&SecurityGroup>,
        contract: Option<&str>,
        stage: &str,
        err: anyhow::Error,
    ) -> Result<Job, JobError> {
        let fabric = &job.fabric;
        warn!(
            external_id = %job.external_id,
            stage = stage,
            error = %format!("{:#}", err),
            "provisioning failed, compensating"
        );

        if let Some(contract_name) = contract {
            if let Err(cleanup_err) = self.deps.fabric.delete_contract(fabric, contract_name).await
            {
                warn!(
                    contract = contract_name,
                    error = %format!("{:#}", cleanup_err),
                    "contract compensation failed"
                );
            }
        }
        if let Some(group) = group {
            if let Err(cleanup_err) = self.deps.fabric.delete_security_group(fabric, group).await {
                warn!(
                    group = %group.group_name,
                    error = %format!("{:#}", cleanup_err),
                    "security group compensation failed"
                );
            }
        }

        let message = format!("{}: {:#}", stage, err);
        self.mark_failed_released(job, &message).await;
        Err(JobError::Internal(err.context(format!(
            "{} for job {}",
            stage, job.external_id
        ))))
    }

    async fn mark_failed_released(&self, job: &Job, message: &str) {
        if let Err(db_err) =
            Job::set_status(job.id, JobStatus::Failed, Some(message), &self.deps.db_pool).await
        {
            warn!(external_id = %job.external_id, error = %db_err, "failed to mark job failed");
        }
        match ComputeNodeAllocation::release_for_job(job.id, &self.deps.db_pool).await {
            Ok(released) => {
                info!(external_id = %job.external_id, released, "allocations released")
            }
            Err(db_err) => {
                warn!(external_id = %job.external_id, error = %db_err, "failed to release allocations")
            }
        }
    }

    /// Find a usable permit-rule protocol, creating one when the fabric has
    /// none configured.
    async fn resolve_protocol(&self, fabric: &str) -> anyhow::Result<String> {
        let protocols = self
            .deps
            .fabric
            .list_protocols(fabric)
            .await
            .context("listing protocols")?;
        if let Some(existing) = protocols
            .iter()
            .find(|p| p.protocol_name.eq_ignore_ascii_case("ip"))
        {
            return Ok(existing.protocol_name.clone());
        }

        let protocol = SecurityProtocol {
            protocol_name: "ip".to_string(),
            match_type: "ip".to_string(),
            description: Some("any IP traffic".to_string()),
            fabric: None,
        };
        self.deps
            .fabric
            .create_protocol(fabric, &protocol)
            .await
            .context("creating protocol")?;
        Ok(protocol.protocol_name)
    }

    // =========================================================================
    // Complete (deprovision)
    // =========================================================================

    pub async fn complete(&self, external_id: &str) -> Result<Job, JobError> {
        let job = Job::find_by_external_id(external_id, &self.deps.db_pool)
            .await
            .map_err(JobError::internal)?
            .ok_or_else(|| JobError::NotFound(external_id.to_string()))?;

        let status = job
            .status()
            .ok_or_else(|| JobError::internal(anyhow::anyhow!("job has unknown status {}", job.status)))?;
        if status.is_terminal() {
            return Ok(job);
        }
        if !status.can_transition_to(JobStatus::Deprovisioning) {
            return Err(JobError::InvalidState {
                external_id: external_id.to_string(),
                status: job.status.clone(),
                operation: "deprovision",
            });
        }

        let job = Job::set_status(job.id, JobStatus::Deprovisioning, None, &self.deps.db_pool)
            .await
            .map_err(JobError::internal)?;
        info!(external_id = %job.external_id, "deprovisioning job");

        let fabric = &job.fabric;
        let group = match self
            .deps
            .fabric
            .get_security_group_by_name(fabric, &job.security_group_name)
            .await
        {
            Ok(group) => group,
            Err(err) => {
                return self.fail_cleanup(&job, "looking up security group", err).await;
            }
        };

        // Reverse creation order. A missing object means a previous attempt
        // got that far; anything else aborts into cleanup_failed.
        let association = ContractAssociation {
            vrf_name: job.vrf.clone(),
            contract_name: job.contract_name.clone(),
            src_group_name: Some(job.security_group_name.clone()),
            src_group_id: group.as_ref().and_then(|g| g.group_id).or(job.security_group_id),
            dst_group_name: Some(job.security_group_name.clone()),
            dst_group_id: group.as_ref().and_then(|g| g.group_id).or(job.security_group_id),
            fabric: None,
        };
        if let Err(err) = self
            .deps
            .fabric
            .delete_contract_association(fabric, &association)
            .await
        {
            if !error_is_not_found(&err) {
                return self
                    .fail_cleanup(&job, "deleting contract association", err)
                    .await;
            }
        }

        if let Err(err) = self.deps.fabric.delete_contract(fabric, &job.contract_name).await {
            if !error_is_not_found(&err) {
                return self.fail_cleanup(&job, "deleting contract", err).await;
            }
        }

        if let Some(group) = &group {
            if let Err(err) = self.deps.fabric.delete_security_group(fabric, group).await {
                if !error_is_not_found(&err) {
                    return self.fail_cleanup(&job, "deleting security group", err).await;
                }
            }
        }

        if let Err(err) = self.deps.deploy.request_deploy(fabric).await {
            return self.fail_cleanup(&job, "deploying configuration", err).await;
        }

        ComputeNodeAllocation::release_for_job(job.id, &self.deps.db_pool)
            .await
            .map_err(JobError::internal)?;
        let job = Job::mark_completed(job.id, &self.deps.db_pool)
            .await
            .map_err(JobError::internal)?;
        info!(external_id = %job.external_id, "job completed");
        Ok(job)
    }

    async fn fail_cleanup(
        &self,
        job: &Job,
        stage: &str,
        err: anyhow::Error,
    ) -> Result<Job, JobError> {
        let message = format!("{}: {:#}", stage, err);
        warn!(external_id = %job.external_id, error = %message, "deprovisioning failed");
        if let Err(db_err) =
            Job::mark_cleanup_failed(job.id, None, &message, &self.deps.db_pool).await
        {
            warn!(external_id = %job.external_id, error = %db_err, "failed to mark job cleanup_failed");
        }
        Err(JobError::Internal(err.context(format!(
            "{} for job {}",
            stage, job.external_id
        ))))
    }

    // =========================================================================
    // Listing and expiry
    // =========================================================================

    pub async fn list(&self, status: Option<JobStatus>) -> Result<Vec<Job>, JobError> {
        Job::list(status, &self.deps.db_pool)
            .await
            .map_err(JobError::internal)
    }

    /// Reclaim expired jobs, one at a time (one deploy per fabric in flight).
    pub async fn cleanup_expired(&self) -> Result<Vec<String>, JobError> {
        let expired = Job::list_expired(Utc::now(), &self.deps.db_pool)
            .await
            .map_err(JobError::internal)?;

        let mut cleaned = Vec::new();
        for job in expired {
            info!(external_id = %job.external_id, "reclaiming expired job");
            match self.complete(&job.external_id).await {
                Ok(done) if done.status == JobStatus::Completed.as_str() => {
                    cleaned.push(job.external_id);
                }
                Ok(done) => {
                    warn!(external_id = %done.external_id, status = %done.status, "expired job not reclaimed");
                }
                Err(err) => {
                    warn!(external_id = %job.external_id, error = %err, "expired job cleanup failed");
                }
            }
        }
        Ok(cleaned)
    }
}

fn validate_submit(request: &SubmitRequest) -> Result<(), JobError> {
    if request.external_id.trim().is_empty() {
        return Err(JobError::Validation("external_id is required".into()));
    }
    if request.name.trim().is_empty() {
        return Err(JobError::Validation("name is required".into()));
    }
    if request.compute_nodes.is_empty() {
        return Err(JobError::Validation("at least one compute node is required".into()));
    }
    let mut seen = HashSet::new();
    for node in &request.compute_nodes {
        if node.trim().is_empty() {
            return Err(JobError::Validation("compute node names must be non-empty".into()));
        }
        if !seen.insert(node.as_str()) {
            return Err(JobError::Validation(format!(
                "compute node {} listed more than once",
                node
            )));
        }
    }
    Ok(())
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db)) if db.is_unique_violation()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(nodes: &[&str]) -> SubmitRequest {
        SubmitRequest {
            external_id: "e42".into(),
            name: "training run".into(),
            compute_nodes: nodes.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn submit_validation() {
        assert!(validate_submit(&request(&["n1", "n2"])).is_ok());
        assert!(validate_submit(&request(&[])).is_err());
        assert!(validate_submit(&request(&["n1", "n1"])).is_err());
        assert!(validate_submit(&request(&[""])).is_err());

        let mut no_id = request(&["n1"]);
        no_id.external_id = "  ".into();
        assert!(validate_submit(&no_id).is_err());
    }
}

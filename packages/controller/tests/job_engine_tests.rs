//! Job engine integration tests: admission, exclusive allocation,
//! compensation and teardown against real Postgres (testcontainers) with a
//! scripted fabric manager.

mod common;

use chrono::Utc;
use common::{allocation_count, seed_node, test_context};
use controller_core::domains::jobs::models::Job;
use controller_core::domains::jobs::{JobError, JobStatus, SubmitRequest};
use controller_core::kernel::test_dependencies::FabricCall;
use uuid::Uuid;

fn submit(external_id: &str, nodes: &[&str]) -> SubmitRequest {
    SubmitRequest {
        external_id: external_id.to_string(),
        name: format!("job {}", external_id),
        compute_nodes: nodes.iter().map(|s| s.to_string()).collect(),
    }
}

#[tokio::test]
async fn happy_provision_creates_segment_and_activates() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-happy", "SERHAPPY1", "Ethernet1/5").await;

    let outcome = ctx
        .engine
        .submit(submit("e-happy", &["n1-happy"]))
        .await
        .expect("submit should succeed");

    assert!(outcome.created);
    let job = &outcome.job;
    assert_eq!(job.status, "active");
    assert!(job.provisioned_at.is_some());
    assert!(job.expires_at.is_some());
    assert_eq!(job.security_group_name, "sg_e-happy");
    assert_eq!(job.contract_name, "cc_e-happy");
    assert!(job.security_group_id.is_some());
    assert_eq!(allocation_count(&ctx.pool, job.id).await, 1);

    // The created group carries exactly the node's switch-port selector.
    let groups = ctx.fabric_api.groups.lock().unwrap();
    let group = groups.get("compute/sg_e-happy").expect("group upstream");
    assert_eq!(group.network_port_selectors.len(), 1);
    assert_eq!(group.network_port_selectors[0].switch_serial, "SERHAPPY1");
    assert_eq!(group.network_port_selectors[0].interface, "Ethernet1/5");
    drop(groups);

    // Strict creation order: group, contract, association, deploy.
    let order: Vec<&str> = ctx
        .fabric_api
        .calls()
        .iter()
        .filter_map(|call| match call {
            FabricCall::CreateGroups { .. } => Some("group"),
            FabricCall::CreateContracts { .. } => Some("contract"),
            FabricCall::CreateAssociations { .. } => Some("association"),
            FabricCall::Deploy { .. } => Some("deploy"),
            _ => None,
        })
        .collect();
    assert_eq!(order, vec!["group", "contract", "association", "deploy"]);
}

#[tokio::test]
async fn replay_returns_existing_job_without_side_effects() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-replay", "SERREPLAY", "Ethernet1/6").await;

    let first = ctx
        .engine
        .submit(submit("e-replay", &["n1-replay"]))
        .await
        .expect("first submit");
    assert!(first.created);
    let calls_after_first = ctx.fabric_api.calls().len();

    let second = ctx
        .engine
        .submit(submit("e-replay", &["n1-replay"]))
        .await
        .expect("replay submit");
    assert!(!second.created);
    assert_eq!(second.job.id, first.job.id);
    assert_eq!(ctx.fabric_api.calls().len(), calls_after_first, "replay must not call upstream");
    assert_eq!(allocation_count(&ctx.pool, first.job.id).await, 1);
}

#[tokio::test]
async fn contention_allocates_exactly_one_winner() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-race", "SERRACE1", "Ethernet1/7").await;
    seed_node(&ctx.pool, "n2-race", "SERRACE2", "Ethernet1/7").await;

    let engine_a = ctx.engine.clone();
    let engine_b = ctx.engine.clone();
    let (a, b) = tokio::join!(
        engine_a.submit(submit("e-race-1", &["n1-race", "n2-race"])),
        engine_b.submit(submit("e-race-2", &["n1-race", "n2-race"])),
    );

    let (winner, loser) = match (&a, &b) {
        (Ok(_), Err(_)) => (a.as_ref().unwrap(), b.as_ref().unwrap_err()),
        (Err(_), Ok(_)) => (b.as_ref().unwrap(), a.as_ref().unwrap_err()),
        other => panic!("expected exactly one winner, got {:?}", other),
    };

    assert_eq!(winner.job.status, "active");
    assert_eq!(allocation_count(&ctx.pool, winner.job.id).await, 2);
    match loser {
        JobError::NodesAllocated(names) => {
            assert_eq!(names, &vec!["n1-race".to_string(), "n2-race".to_string()]);
        }
        other => panic!("expected allocation conflict, got {:?}", other),
    }

    // The loser rolled back entirely: one job row, one group creation.
    let group_creates = ctx
        .fabric_api
        .calls()
        .iter()
        .filter(|call| matches!(call, FabricCall::CreateGroups { .. }))
        .count();
    assert_eq!(group_creates, 1);
}

#[tokio::test]
async fn unknown_node_rejected_without_side_effects() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-known", "SERKNOWN1", "Ethernet1/8").await;

    let err = ctx
        .engine
        .submit(submit("e-unknown", &["n1-known", "n-ghost"]))
        .await
        .unwrap_err();
    match err {
        JobError::UnknownNodes(names) => assert_eq!(names, vec!["n-ghost".to_string()]),
        other => panic!("expected unknown nodes, got {:?}", other),
    }

    assert!(ctx.fabric_api.calls().is_empty());
    assert!(Job::find_by_external_id("e-unknown", &ctx.pool)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn unwired_node_rejected_as_validation_failure() {
    let ctx = test_context().await;
    // A node with no port mappings at all.
    let node = controller_core::domains::inventory::ComputeNode {
        id: Uuid::new_v4(),
        name: "n-unwired".to_string(),
        hostname: None,
        ip: None,
        mac: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    node.insert(&ctx.pool).await.unwrap();

    let err = ctx
        .engine
        .submit(submit("e-unwired", &["n-unwired"]))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Validation(_)));
    assert!(ctx.fabric_api.calls().is_empty());
}

#[tokio::test]
async fn missing_compute_network_rejects_before_any_write() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-nonet", "SERNONET1", "Ethernet1/22").await;
    ctx.fabric_api.networks.lock().unwrap().clear();

    let err = ctx
        .engine
        .submit(submit("e-nonet", &["n1-nonet"]))
        .await
        .unwrap_err();
    match err {
        JobError::Validation(message) => assert!(message.contains("net_compute")),
        other => panic!("expected validation failure, got {:?}", other),
    }
    assert!(Job::find_by_external_id("e-nonet", &ctx.pool)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn contract_failure_compensates_group_and_releases() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-cfail", "SERCFAIL1", "Ethernet1/9").await;
    ctx.fabric_api.fail_op("create_contracts", 500, "internal error");

    let err = ctx
        .engine
        .submit(submit("e-cfail", &["n1-cfail"]))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::Internal(_)));

    let job = Job::find_by_external_id("e-cfail", &ctx.pool)
        .await
        .unwrap()
        .expect("job row survives as failed");
    assert_eq!(job.status, "failed");
    assert!(job.error.as_deref().unwrap_or("").contains("creating contract"));
    assert_eq!(allocation_count(&ctx.pool, job.id).await, 0);

    assert!(ctx
        .fabric_api
        .has_call(|call| matches!(call, FabricCall::DeleteGroup { name, .. } if name == "sg_e-cfail")));
    // Nothing was deployed.
    assert!(!ctx.fabric_api.has_call(|call| matches!(call, FabricCall::Deploy { .. })));
}

#[tokio::test]
async fn association_failure_compensates_contract_and_group() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-afail", "SERAFAIL1", "Ethernet1/10").await;
    ctx.fabric_api
        .fail_op("create_contract_associations", 400, "invalid vrf");

    ctx.engine
        .submit(submit("e-afail", &["n1-afail"]))
        .await
        .unwrap_err();

    let job = Job::find_by_external_id("e-afail", &ctx.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "failed");
    assert_eq!(allocation_count(&ctx.pool, job.id).await, 0);
    assert!(ctx
        .fabric_api
        .has_call(|call| matches!(call, FabricCall::DeleteContract { .. })));
    assert!(ctx
        .fabric_api
        .has_call(|call| matches!(call, FabricCall::DeleteGroup { .. })));
}

#[tokio::test]
async fn deploy_failure_retains_objects_for_reconciliation() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-dfail", "SERDFAIL1", "Ethernet1/11").await;
    ctx.fabric_api.fail_op("deploy_config", 500, "switch unreachable");

    ctx.engine
        .submit(submit("e-dfail", &["n1-dfail"]))
        .await
        .unwrap_err();

    let job = Job::find_by_external_id("e-dfail", &ctx.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "cleanup_failed");
    assert!(job.security_group_id.is_some());
    // Operators reconcile: allocations and security objects stay.
    assert_eq!(allocation_count(&ctx.pool, job.id).await, 1);
    assert!(!ctx
        .fabric_api
        .has_call(|call| matches!(call, FabricCall::DeleteGroup { .. })));
}

#[tokio::test]
async fn complete_tears_down_in_reverse_order() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-done", "SERDONE1", "Ethernet1/12").await;

    let outcome = ctx.engine.submit(submit("e-done", &["n1-done"])).await.unwrap();
    let job = ctx.engine.complete("e-done").await.expect("complete");

    assert_eq!(job.status, "completed");
    assert!(job.completed_at.is_some());
    assert_eq!(allocation_count(&ctx.pool, outcome.job.id).await, 0);

    let teardown: Vec<&str> = ctx
        .fabric_api
        .calls()
        .iter()
        .filter_map(|call| match call {
            FabricCall::DeleteAssociation { .. } => Some("association"),
            FabricCall::DeleteContract { .. } => Some("contract"),
            FabricCall::DeleteGroup { .. } => Some("group"),
            _ => None,
        })
        .collect();
    assert_eq!(teardown, vec!["association", "contract", "group"]);

    // One deploy for provisioning, one for teardown.
    let deploys = ctx
        .fabric_api
        .calls()
        .iter()
        .filter(|call| matches!(call, FabricCall::Deploy { .. }))
        .count();
    assert_eq!(deploys, 2);
}

#[tokio::test]
async fn complete_is_a_noop_on_completed_jobs() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-noop", "SERNOOP1", "Ethernet1/13").await;

    ctx.engine.submit(submit("e-noop", &["n1-noop"])).await.unwrap();
    let first = ctx.engine.complete("e-noop").await.unwrap();
    let calls_after_first = ctx.fabric_api.calls().len();

    let second = ctx.engine.complete("e-noop").await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.status, "completed");
    assert_eq!(second.completed_at, first.completed_at);
    assert_eq!(ctx.fabric_api.calls().len(), calls_after_first);
}

#[tokio::test]
async fn complete_unknown_job_is_not_found() {
    let ctx = test_context().await;
    let err = ctx.engine.complete("e-never-submitted").await.unwrap_err();
    assert!(matches!(err, JobError::NotFound(_)));
}

#[tokio::test]
async fn cleanup_failed_jobs_can_be_retried_to_completion() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-retry", "SERRETRY1", "Ethernet1/14").await;

    ctx.engine.submit(submit("e-retry", &["n1-retry"])).await.unwrap();

    // First teardown attempt dies on the contract delete.
    ctx.fabric_api.fail_op("delete_contract", 409, "contract in use");
    ctx.engine.complete("e-retry").await.unwrap_err();
    let job = Job::find_by_external_id("e-retry", &ctx.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.status, "cleanup_failed");
    assert_eq!(allocation_count(&ctx.pool, job.id).await, 1);

    // Retry succeeds; the already-deleted association reads as not-found and
    // is absorbed.
    ctx.fabric_api.clear_failure("delete_contract");
    let job = ctx.engine.complete("e-retry").await.expect("retry");
    assert_eq!(job.status, "completed");
    assert_eq!(allocation_count(&ctx.pool, job.id).await, 0);
}

#[tokio::test]
async fn expiry_sweep_reclaims_overdue_jobs() {
    let ctx = test_context().await;
    seed_node(&ctx.pool, "n1-exp", "SEREXP1", "Ethernet1/15").await;
    seed_node(&ctx.pool, "n2-exp", "SEREXP2", "Ethernet1/15").await;

    let expired = ctx.engine.submit(submit("e-expired", &["n1-exp"])).await.unwrap();
    let fresh = ctx.engine.submit(submit("e-fresh", &["n2-exp"])).await.unwrap();

    sqlx::query("UPDATE jobs SET expires_at = NOW() - INTERVAL '1 hour' WHERE id = $1")
        .bind(expired.job.id)
        .execute(&ctx.pool)
        .await
        .unwrap();

    let cleaned = ctx.engine.cleanup_expired().await.unwrap();
    assert!(cleaned.contains(&"e-expired".to_string()));
    assert!(!cleaned.contains(&"e-fresh".to_string()));

    let reclaimed = Job::find_by_external_id("e-expired", &ctx.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reclaimed.status, "completed");
    let untouched = Job::find_by_external_id("e-fresh", &ctx.pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(untouched.status, "active");
    assert_eq!(allocation_count(&ctx.pool, fresh.job.id).await, 1);
}

//! Inventory sync integration tests: ingest filtering, convergence, stale
//! demotion, uplink caching and the worker's lease/status bookkeeping.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::Utc;
use common::test_context;
use controller_core::domains::inventory::{Switch, SwitchPort};
use controller_core::kernel::sync::worker::TickOutcome;
use controller_core::kernel::sync::{sync_fabric, SyncWorker, SyncWorkerConfig};
use controller_core::kernel::BaseCache;
use ndfc::types::{NdInterface, NdLink, NdSwitch};

fn upstream_switch(name: &str, serial: &str, role: &str) -> NdSwitch {
    NdSwitch {
        name: Some(name.to_string()),
        serial_number: Some(serial.to_string()),
        model: Some("N9K-C93180YC-EX".to_string()),
        ip: Some("10.1.0.1".to_string()),
        role: Some(role.to_string()),
    }
}

fn interface(name: &str) -> NdInterface {
    NdInterface {
        if_name: Some(name.to_string()),
        description: None,
        admin_status: Some("up".to_string()),
        speed: Some("25G".to_string()),
    }
}

fn uplink(serial: &str, if_name: &str, peer_serial: &str, peer_if: &str) -> NdLink {
    serde_json::from_value(serde_json::json!({
        "sw1-info": { "sw-serial-number": serial, "if-name": if_name },
        "sw2-info": { "sw-serial-number": peer_serial, "if-name": peer_if },
    }))
    .unwrap()
}

#[tokio::test]
async fn sync_filters_roles_interfaces_and_uplinks() {
    let ctx = test_context().await;
    let start = Utc::now();

    *ctx.fabric_api.switches.lock().unwrap() = vec![
        upstream_switch("leaf-1", "SYNCLEAF1", "leaf"),
        upstream_switch("spine-1", "SYNCSPINE1", "spine"),
        upstream_switch("no-serial", "", "leaf"),
    ];
    ctx.fabric_api.interfaces.lock().unwrap().insert(
        "SYNCLEAF1".to_string(),
        vec![
            interface("Ethernet1/1"),
            interface("Ethernet1/49"), // uplink, excluded below
            interface("Loopback0"),
            interface("mgmt0"),
            interface("port-channel1"),
        ],
    );
    *ctx.fabric_api.links.lock().unwrap() =
        vec![uplink("SYNCLEAF1", "Ethernet1/49", "SYNCSPINE1", "Ethernet1/1")];

    let outcome = sync_fabric(&ctx.deps, "compute").await.expect("sync");
    assert_eq!(outcome.switches_synced, 1);
    assert_eq!(outcome.error_count, 0);

    assert!(Switch::find_by_serial("SYNCLEAF1", &ctx.pool).await.unwrap().is_some());
    assert!(Switch::find_by_serial("SYNCSPINE1", &ctx.pool).await.unwrap().is_none());

    let leaf = Switch::find_by_serial("SYNCLEAF1", &ctx.pool).await.unwrap().unwrap();
    let ports = SwitchPort::list_by_switch(&leaf.id, &ctx.pool).await.unwrap();
    let names: Vec<&str> = ports.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["Ethernet1/1"]);
    assert!(ports[0].is_present);
    assert!(ports[0].last_seen_at >= start);
    assert_eq!(ports[0].id, format!("{}:Ethernet1/1", leaf.id));
}

#[tokio::test]
async fn resync_of_unchanged_fabric_converges() {
    let ctx = test_context().await;

    *ctx.fabric_api.switches.lock().unwrap() =
        vec![upstream_switch("leaf-2", "SYNCCONV1", "leaf")];
    ctx.fabric_api
        .interfaces
        .lock()
        .unwrap()
        .insert("SYNCCONV1".to_string(), vec![interface("Ethernet1/2")]);

    sync_fabric(&ctx.deps, "compute").await.unwrap();
    let leaf = Switch::find_by_serial("SYNCCONV1", &ctx.pool).await.unwrap().unwrap();
    let before = SwitchPort::list_by_switch(&leaf.id, &ctx.pool).await.unwrap();

    sync_fabric(&ctx.deps, "compute").await.unwrap();
    let after = SwitchPort::list_by_switch(&leaf.id, &ctx.pool).await.unwrap();

    // Row contents converge (timestamps aside): same ids, names, presence.
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.id, a.id);
        assert_eq!(b.name, a.name);
        assert_eq!(b.description, a.description);
        assert_eq!(b.admin_state, a.admin_state);
        assert_eq!(b.speed, a.speed);
        assert_eq!(b.is_present, a.is_present);
    }
}

#[tokio::test]
async fn ports_unseen_for_a_day_are_demoted_not_deleted() {
    let ctx = test_context().await;

    *ctx.fabric_api.switches.lock().unwrap() =
        vec![upstream_switch("leaf-3", "SYNCSTALE1", "leaf")];
    ctx.fabric_api.interfaces.lock().unwrap().insert(
        "SYNCSTALE1".to_string(),
        vec![interface("Ethernet1/3"), interface("Ethernet1/4")],
    );

    sync_fabric(&ctx.deps, "compute").await.unwrap();
    let leaf = Switch::find_by_serial("SYNCSTALE1", &ctx.pool).await.unwrap().unwrap();

    // Ethernet1/4 disappears from the fabric and its last sighting ages out.
    ctx.fabric_api
        .interfaces
        .lock()
        .unwrap()
        .insert("SYNCSTALE1".to_string(), vec![interface("Ethernet1/3")]);
    sqlx::query(
        "UPDATE switch_ports SET last_seen_at = NOW() - INTERVAL '25 hours' WHERE id = $1",
    )
    .bind(format!("{}:Ethernet1/4", leaf.id))
    .execute(&ctx.pool)
    .await
    .unwrap();

    let outcome = sync_fabric(&ctx.deps, "compute").await.unwrap();
    assert!(outcome.ports_demoted >= 1);

    let ports = SwitchPort::list_by_switch(&leaf.id, &ctx.pool).await.unwrap();
    let stale = ports.iter().find(|p| p.name == "Ethernet1/4").expect("still stored");
    assert!(!stale.is_present);
    let live = ports.iter().find(|p| p.name == "Ethernet1/3").unwrap();
    assert!(live.is_present);
}

#[tokio::test]
async fn uplink_set_is_cached_between_runs() {
    let ctx = test_context().await;

    *ctx.fabric_api.switches.lock().unwrap() =
        vec![upstream_switch("leaf-4", "SYNCCACHE1", "leaf")];
    ctx.fabric_api
        .interfaces
        .lock()
        .unwrap()
        .insert("SYNCCACHE1".to_string(), vec![interface("Ethernet1/5")]);

    sync_fabric(&ctx.deps, "compute").await.unwrap();
    sync_fabric(&ctx.deps, "compute").await.unwrap();

    assert_eq!(ctx.fabric_api.link_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(ctx.fabric_api.interface_fetches.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failing_switch_does_not_abort_the_run() {
    let ctx = test_context().await;

    *ctx.fabric_api.switches.lock().unwrap() = vec![
        upstream_switch("leaf-5", "SYNCERR1", "leaf"),
        upstream_switch("leaf-6", "SYNCERR2", "leaf"),
    ];
    // Only one switch has scripted interfaces; the other returns an empty
    // list, so to exercise the error path fail the whole endpoint for one
    // call pattern instead: script a failure, then verify error_count.
    ctx.fabric_api
        .interfaces
        .lock()
        .unwrap()
        .insert("SYNCERR1".to_string(), vec![interface("Ethernet1/6")]);
    ctx.fabric_api.fail_op("list_interfaces", 500, "switch busy");

    let outcome = sync_fabric(&ctx.deps, "compute").await.expect("run survives");
    assert_eq!(outcome.error_count, 2);

    ctx.fabric_api.clear_failure("list_interfaces");
    let outcome = sync_fabric(&ctx.deps, "compute").await.unwrap();
    assert_eq!(outcome.error_count, 0);
    assert!(outcome.ports_written >= 1);
}

#[tokio::test]
async fn worker_tick_publishes_status_and_releases_lease() {
    let ctx = test_context().await;

    *ctx.fabric_api.switches.lock().unwrap() =
        vec![upstream_switch("leaf-7", "SYNCTICK1", "leaf")];
    ctx.fabric_api
        .interfaces
        .lock()
        .unwrap()
        .insert("SYNCTICK1".to_string(), vec![interface("Ethernet1/7")]);

    let worker = SyncWorker::new(
        ctx.deps.clone(),
        SyncWorkerConfig::new("compute", Duration::from_secs(3600)),
    );
    let outcome = worker.run_tick().await;
    assert!(matches!(outcome, TickOutcome::Completed(_)), "{:?}", outcome);

    let cache = &ctx.cache;
    assert_eq!(cache.get("sync:ndfc:compute:lock").await.unwrap(), None);
    assert_eq!(cache.get("sync:ndfc:compute:lock_info").await.unwrap(), None);
    assert_eq!(
        cache.get("sync:ndfc:compute:in_progress").await.unwrap().as_deref(),
        Some("0")
    );
    assert_eq!(
        cache.get("sync:ndfc:compute:last_status").await.unwrap().as_deref(),
        Some("ok")
    );
    assert!(cache.get("sync:ndfc:compute:last_run_ts").await.unwrap().is_some());
    assert!(cache.get("sync:ndfc:compute:last_finish_ts").await.unwrap().is_some());
    assert!(cache.get("sync:ndfc:compute:last_duration_ms").await.unwrap().is_some());
    assert_eq!(cache.get("sync:ndfc:compute:last_error").await.unwrap(), None);
}

#[tokio::test]
async fn failed_run_sets_cooldown_and_skips_next_tick() {
    let ctx = test_context().await;
    ctx.fabric_api.fail_op("list_switches", 500, "inventory backend down");

    let worker = SyncWorker::new(
        ctx.deps.clone(),
        SyncWorkerConfig::new("compute", Duration::from_secs(3600)),
    );
    let outcome = worker.run_tick().await;
    assert!(matches!(outcome, TickOutcome::Failed(_)));

    let cache = &ctx.cache;
    assert_eq!(
        cache.get("sync:ndfc:compute:last_status").await.unwrap().as_deref(),
        Some("error")
    );
    assert!(cache.get("sync:ndfc:compute:last_error").await.unwrap().is_some());
    assert!(cache.get("sync:ndfc:compute:cooldown_until").await.unwrap().is_some());
    // The lease itself was released.
    assert_eq!(cache.get("sync:ndfc:compute:lock").await.unwrap(), None);

    // Next tick backs off without touching the fabric manager.
    ctx.fabric_api.clear_failure("list_switches");
    let calls_before = ctx.fabric_api.calls().len();
    let outcome = worker.run_tick().await;
    assert!(matches!(outcome, TickOutcome::SkippedCooldown));
    assert_eq!(ctx.fabric_api.calls().len(), calls_before);
}

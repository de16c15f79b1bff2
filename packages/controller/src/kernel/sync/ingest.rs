//! The body of one sync run: fetch topology from the fabric manager and
//! upsert it into the inventory store.

use std::collections::HashSet;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::domains::inventory::filters::{is_ethernet_port_name, is_retained_switch_role};
use crate::domains::inventory::{Fabric, Switch, SwitchPort, SwitchPortUpsert};
use crate::kernel::deps::ServerDeps;
use crate::kernel::sync::uplinks_key;

/// Deadline for fetching one switch's interfaces.
const PER_SWITCH_TIMEOUT: Duration = Duration::from_secs(45);

/// The uplink set changes when cabling changes, which is rare; cache it so
/// back-to-back syncs skip the links fetch.
const UPLINKS_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

/// Ports unseen for this long are demoted to absent (never deleted).
const PORT_STALE_AFTER: chrono::Duration = chrono::Duration::hours(24);

#[derive(Debug, Default, Clone)]
pub struct SyncOutcome {
    pub switches_synced: usize,
    pub ports_written: u64,
    pub ports_demoted: u64,
    /// Switches whose interface fetch failed; they did not abort the run.
    pub error_count: u32,
}

/// Run one full synchronization of `fabric_name`.
pub async fn sync_fabric(deps: &ServerDeps, fabric_name: &str) -> Result<SyncOutcome> {
    let sync_started = Utc::now();
    let mut outcome = SyncOutcome::default();

    // Fabric row first; the upstream type is best-effort decoration.
    let fabric_type = match deps.fabric.get_fabric(fabric_name).await {
        Ok(found) => found.and_then(|f| f.fabric_type),
        Err(err) => {
            debug!(fabric = %fabric_name, error = %format!("{:#}", err), "fabric metadata fetch failed");
            None
        }
    };
    let fabric = Fabric::ensure(fabric_name, fabric_type.as_deref(), &deps.db_pool)
        .await
        .context("ensuring fabric row")?;

    // Switches, filtered to access-layer roles with a serial number.
    let upstream_switches = deps
        .fabric
        .list_switches(fabric_name)
        .await
        .context("fetching switch inventory")?;

    let mut synced_switches = Vec::new();
    for upstream in upstream_switches {
        let role_retained = upstream
            .role
            .as_deref()
            .is_some_and(is_retained_switch_role);
        let Some(serial) = upstream.serial_number.as_deref().filter(|s| !s.is_empty()) else {
            continue;
        };
        if !role_retained {
            continue;
        }

        let switch = Switch::upsert(
            &fabric.id,
            upstream.name.as_deref().unwrap_or(serial),
            serial,
            upstream.model.as_deref(),
            upstream.ip.as_deref(),
            upstream.role.as_deref(),
            &deps.db_pool,
        )
        .await
        .with_context(|| format!("upserting switch {}", serial))?;
        synced_switches.push(switch);
    }
    outcome.switches_synced = synced_switches.len();

    let uplinks = uplink_set(deps, fabric_name).await?;

    // Interfaces per switch; one switch failing does not abort the run.
    for switch in &synced_switches {
        let fetched = tokio::time::timeout(
            PER_SWITCH_TIMEOUT,
            deps.fabric.list_interfaces(&switch.serial_number),
        )
        .await;

        let interfaces = match fetched {
            Ok(Ok(interfaces)) => interfaces,
            Ok(Err(err)) => {
                warn!(
                    switch = %switch.serial_number,
                    error = %format!("{:#}", err),
                    "interface fetch failed, skipping switch"
                );
                outcome.error_count += 1;
                continue;
            }
            Err(_) => {
                warn!(switch = %switch.serial_number, "interface fetch timed out, skipping switch");
                outcome.error_count += 1;
                continue;
            }
        };

        let seen_at = Utc::now();
        let ports: Vec<SwitchPortUpsert> = interfaces
            .into_iter()
            .filter_map(|iface| {
                let name = iface.if_name?;
                if !is_ethernet_port_name(&name) {
                    return None;
                }
                if uplinks.contains(&format!("{}:{}", switch.serial_number, name)) {
                    return None;
                }
                Some(SwitchPortUpsert {
                    switch_id: switch.id.clone(),
                    name,
                    description: iface.description,
                    admin_state: iface.admin_status,
                    speed: iface.speed,
                    last_seen_at: seen_at,
                })
            })
            .collect();

        if !ports.is_empty() {
            outcome.ports_written += SwitchPort::upsert_batch(&ports, &deps.db_pool)
                .await
                .with_context(|| format!("upserting ports of {}", switch.serial_number))?;
        }
    }

    outcome.ports_demoted =
        SwitchPort::demote_stale(sync_started - PORT_STALE_AFTER, &deps.db_pool)
            .await
            .context("demoting stale ports")?;

    info!(
        fabric = %fabric_name,
        switches = outcome.switches_synced,
        ports = outcome.ports_written,
        demoted = outcome.ports_demoted,
        errors = outcome.error_count,
        "inventory sync finished"
    );
    Ok(outcome)
}

/// `"<serial>:<ifname>"` endpoints of inter-switch links, cached so repeated
/// syncs do not refetch. Cache failures degrade to a fresh fetch.
async fn uplink_set(deps: &ServerDeps, fabric_name: &str) -> Result<HashSet<String>> {
    let key = uplinks_key(fabric_name);
    match deps.cache.get(&key).await {
        Ok(Some(cached)) => {
            if let Ok(parsed) = serde_json::from_str::<HashSet<String>>(&cached) {
                debug!(fabric = %fabric_name, uplinks = parsed.len(), "using cached uplink set");
                return Ok(parsed);
            }
        }
        Ok(None) => {}
        Err(err) => debug!(error = %format!("{:#}", err), "uplink cache read failed"),
    }

    let links = deps
        .fabric
        .list_links(fabric_name)
        .await
        .context("fetching inter-switch links")?;
    let uplinks: HashSet<String> = links.iter().flat_map(|l| l.endpoint_keys()).collect();

    match serde_json::to_string(&uplinks) {
        Ok(serialized) => {
            if let Err(err) = deps.cache.set(&key, &serialized, UPLINKS_CACHE_TTL).await {
                debug!(error = %format!("{:#}", err), "uplink cache write failed");
            }
        }
        Err(err) => debug!(error = %err, "uplink set serialization failed"),
    }

    Ok(uplinks)
}

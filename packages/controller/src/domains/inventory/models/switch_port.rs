use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, QueryBuilder};

/// Batched upserts stay below the bind-parameter ceiling with room to spare.
const UPSERT_CHUNK: usize = 500;

/// SwitchPort - one front-panel Ethernet interface of a synced switch.
///
/// Ports absent from a successful sync are never deleted; after 24h without
/// a sighting they are demoted to `is_present = false` so historical
/// port-mappings keep resolving.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SwitchPort {
    pub id: String,
    pub switch_id: String,
    pub name: String,
    pub description: Option<String>,
    pub admin_state: Option<String>,
    pub speed: Option<String>,
    pub is_present: bool,
    pub last_seen_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The sync-facing subset of a port row.
#[derive(Debug, Clone)]
pub struct SwitchPortUpsert {
    pub switch_id: String,
    pub name: String,
    pub description: Option<String>,
    pub admin_state: Option<String>,
    pub speed: Option<String>,
    pub last_seen_at: DateTime<Utc>,
}

impl SwitchPort {
    pub fn deterministic_id(switch_id: &str, name: &str) -> String {
        format!("{}:{}", switch_id, name)
    }

    /// Insert-or-update ports in chunks, keyed by `(switch_id, name)`.
    /// Every upserted port is marked present and stamped with its sync time.
    pub async fn upsert_batch(ports: &[SwitchPortUpsert], pool: &PgPool) -> Result<u64> {
        let mut written = 0;
        for chunk in ports.chunks(UPSERT_CHUNK) {
            let mut builder = QueryBuilder::new(
                "INSERT INTO switch_ports \
                 (id, switch_id, name, description, admin_state, speed, is_present, last_seen_at) ",
            );
            builder.push_values(chunk, |mut row, port| {
                row.push_bind(Self::deterministic_id(&port.switch_id, &port.name))
                    .push_bind(&port.switch_id)
                    .push_bind(&port.name)
                    .push_bind(&port.description)
                    .push_bind(&port.admin_state)
                    .push_bind(&port.speed)
                    .push_bind(true)
                    .push_bind(port.last_seen_at);
            });
            builder.push(
                " ON CONFLICT (switch_id, name) DO UPDATE \
                 SET description = EXCLUDED.description, \
                     admin_state = EXCLUDED.admin_state, \
                     speed = EXCLUDED.speed, \
                     is_present = TRUE, \
                     last_seen_at = EXCLUDED.last_seen_at, \
                     updated_at = NOW()",
            );
            let result = builder.build().execute(pool).await?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    /// Demote ports unseen since `cutoff`. Returns the number demoted.
    pub async fn demote_stale(cutoff: DateTime<Utc>, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE switch_ports
            SET is_present = FALSE, updated_at = NOW()
            WHERE is_present AND last_seen_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn list_by_switch(switch_id: &str, pool: &PgPool) -> Result<Vec<Self>> {
        let ports = sqlx::query_as::<_, SwitchPort>(
            "SELECT * FROM switch_ports WHERE switch_id = $1 ORDER BY name",
        )
        .bind(switch_id)
        .fetch_all(pool)
        .await?;
        Ok(ports)
    }

    pub async fn find_by_id(id: &str, pool: &PgPool) -> Result<Option<Self>> {
        let port = sqlx::query_as::<_, SwitchPort>("SELECT * FROM switch_ports WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?;
        Ok(port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_ids_are_stable_across_syncs() {
        let a = SwitchPort::deterministic_id("fabric:compute:ABC123", "Ethernet1/5");
        let b = SwitchPort::deterministic_id("fabric:compute:ABC123", "Ethernet1/5");
        assert_eq!(a, b);
        assert_eq!(a, "fabric:compute:ABC123:Ethernet1/5");
    }
}

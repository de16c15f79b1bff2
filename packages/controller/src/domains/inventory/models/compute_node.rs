use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// ComputeNode - a server whose NICs are cabled into synced switch ports
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ComputeNode {
    pub id: Uuid,
    pub name: String,
    pub hostname: Option<String>,
    pub ip: Option<String>,
    pub mac: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One NIC of a node resolved through the inventory to its switch port.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct NodePortPath {
    pub node_id: Uuid,
    pub node_name: String,
    pub nic_name: String,
    pub switch_serial: String,
    pub interface_name: String,
}

impl ComputeNode {
    pub async fn find_by_name(name: &str, pool: &PgPool) -> Result<Option<Self>> {
        let node = sqlx::query_as::<_, ComputeNode>("SELECT * FROM compute_nodes WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(node)
    }

    pub async fn find_by_names(names: &[String], pool: &PgPool) -> Result<Vec<Self>> {
        let nodes = sqlx::query_as::<_, ComputeNode>(
            "SELECT * FROM compute_nodes WHERE name = ANY($1) ORDER BY name",
        )
        .bind(names)
        .fetch_all(pool)
        .await?;
        Ok(nodes)
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<Self> {
        let node = sqlx::query_as::<_, ComputeNode>(
            r#"
            INSERT INTO compute_nodes (id, name, hostname, ip, mac)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.hostname)
        .bind(&self.ip)
        .bind(&self.mac)
        .fetch_one(pool)
        .await?;
        Ok(node)
    }

    pub async fn add_port_mapping(
        node_id: Uuid,
        switch_port_id: &str,
        nic_name: &str,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO compute_node_port_mappings (node_id, switch_port_id, nic_name)
            VALUES ($1, $2, $3)
            ON CONFLICT (node_id, switch_port_id) DO UPDATE SET nic_name = EXCLUDED.nic_name
            "#,
        )
        .bind(node_id)
        .bind(switch_port_id)
        .bind(nic_name)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Resolve the switch-port paths for a set of nodes in one query.
    pub async fn port_paths(node_ids: &[Uuid], pool: &PgPool) -> Result<Vec<NodePortPath>> {
        let paths = sqlx::query_as::<_, NodePortPath>(
            r#"
            SELECT m.node_id,
                   n.name AS node_name,
                   m.nic_name,
                   s.serial_number AS switch_serial,
                   p.name AS interface_name
            FROM compute_node_port_mappings m
            JOIN compute_nodes n ON n.id = m.node_id
            JOIN switch_ports p ON p.id = m.switch_port_id
            JOIN switches s ON s.id = p.switch_id
            WHERE m.node_id = ANY($1)
            ORDER BY n.name, m.nic_name
            "#,
        )
        .bind(node_ids)
        .fetch_all(pool)
        .await?;
        Ok(paths)
    }
}

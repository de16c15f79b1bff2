use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Switch - an access-layer device in a fabric (spines are filtered at ingest)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Switch {
    pub id: String,
    pub fabric_id: String,
    pub name: String,
    pub serial_number: String,
    pub model: Option<String>,
    pub ip: Option<String>,
    pub role: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Switch {
    pub fn deterministic_id(fabric_id: &str, serial_number: &str) -> String {
        format!("{}:{}", fabric_id, serial_number)
    }

    /// Insert-or-update keyed by serial number.
    pub async fn upsert(
        fabric_id: &str,
        name: &str,
        serial_number: &str,
        model: Option<&str>,
        ip: Option<&str>,
        role: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        let switch = sqlx::query_as::<_, Switch>(
            r#"
            INSERT INTO switches (id, fabric_id, name, serial_number, model, ip, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (serial_number) DO UPDATE
            SET fabric_id = EXCLUDED.fabric_id,
                name = EXCLUDED.name,
                model = EXCLUDED.model,
                ip = EXCLUDED.ip,
                role = EXCLUDED.role,
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Self::deterministic_id(fabric_id, serial_number))
        .bind(fabric_id)
        .bind(name)
        .bind(serial_number)
        .bind(model)
        .bind(ip)
        .bind(role)
        .fetch_one(pool)
        .await?;
        Ok(switch)
    }

    pub async fn list_by_fabric(fabric_id: &str, pool: &PgPool) -> Result<Vec<Self>> {
        let switches = sqlx::query_as::<_, Switch>(
            "SELECT * FROM switches WHERE fabric_id = $1 ORDER BY serial_number",
        )
        .bind(fabric_id)
        .fetch_all(pool)
        .await?;
        Ok(switches)
    }

    pub async fn find_by_serial(serial_number: &str, pool: &PgPool) -> Result<Option<Self>> {
        let switch = sqlx::query_as::<_, Switch>("SELECT * FROM switches WHERE serial_number = $1")
            .bind(serial_number)
            .fetch_optional(pool)
            .await?;
        Ok(switch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_deterministic() {
        assert_eq!(
            Switch::deterministic_id("fabric:compute", "ABC123"),
            "fabric:compute:ABC123"
        );
    }
}

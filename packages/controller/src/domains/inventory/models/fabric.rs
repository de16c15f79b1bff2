use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

/// Fabric - one administrative domain in the fabric manager, mirrored locally
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Fabric {
    pub id: String,
    pub name: String,
    pub fabric_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Fabric {
    /// Deterministic ID so repeated syncs converge on one row.
    pub fn deterministic_id(name: &str) -> String {
        format!("fabric:{}", name)
    }

    /// Insert the fabric if absent, returning the stored row either way.
    pub async fn ensure(name: &str, fabric_type: Option<&str>, pool: &PgPool) -> Result<Self> {
        let fabric = sqlx::query_as::<_, Fabric>(
            r#"
            INSERT INTO fabrics (id, name, fabric_type)
            VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE
            SET fabric_type = COALESCE(EXCLUDED.fabric_type, fabrics.fabric_type),
                updated_at = NOW()
            RETURNING *
            "#,
        )
        .bind(Self::deterministic_id(name))
        .bind(name)
        .bind(fabric_type)
        .fetch_one(pool)
        .await?;
        Ok(fabric)
    }

    pub async fn find_by_name(name: &str, pool: &PgPool) -> Result<Option<Self>> {
        let fabric = sqlx::query_as::<_, Fabric>("SELECT * FROM fabrics WHERE name = $1")
            .bind(name)
            .fetch_optional(pool)
            .await?;
        Ok(fabric)
    }
}

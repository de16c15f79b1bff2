use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// ComputeNodeAllocation - exclusive ownership of a node by a single job.
///
/// The primary key on `node_id` is the concurrency primitive: under
/// concurrent submissions the loser's transaction fails with a unique
/// violation and rolls back, leaking nothing.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ComputeNodeAllocation {
    pub node_id: Uuid,
    pub job_id: Uuid,
    pub allocated_at: DateTime<Utc>,
}

/// Signals "some requested node is already owned" distinctly from plain
/// database failures, so the engine can answer with a conflict.
#[derive(Debug, thiserror::Error)]
pub enum AllocationError {
    #[error("one or more compute nodes are already allocated")]
    Conflict,
    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl ComputeNodeAllocation {
    /// Insert one allocation row per node inside the admission transaction.
    pub async fn allocate_all(
        job_id: Uuid,
        node_ids: &[Uuid],
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<(), AllocationError> {
        for node_id in node_ids {
            let inserted = sqlx::query(
                "INSERT INTO compute_node_allocations (node_id, job_id) VALUES ($1, $2)",
            )
            .bind(node_id)
            .bind(job_id)
            .execute(&mut **tx)
            .await;

            match inserted {
                Ok(_) => {}
                Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                    return Err(AllocationError::Conflict);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(())
    }

    pub async fn release_for_job(job_id: Uuid, pool: &PgPool) -> Result<u64> {
        let result = sqlx::query("DELETE FROM compute_node_allocations WHERE job_id = $1")
            .bind(job_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn find_for_job(job_id: Uuid, pool: &PgPool) -> Result<Vec<Self>> {
        let allocations = sqlx::query_as::<_, ComputeNodeAllocation>(
            "SELECT * FROM compute_node_allocations WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_all(pool)
        .await?;
        Ok(allocations)
    }

    /// Names of the requested nodes currently owned by some job; used to
    /// build a legible conflict error after a failed allocation.
    pub async fn allocated_names(node_ids: &[Uuid], pool: &PgPool) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT n.name
            FROM compute_node_allocations a
            JOIN compute_nodes n ON n.id = a.node_id
            WHERE a.node_id = ANY($1)
            ORDER BY n.name
            "#,
        )
        .bind(node_ids)
        .fetch_all(pool)
        .await?;
        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

/// Job - one scheduler batch job and the network segment provisioned for it
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    pub id: Uuid,
    pub external_id: String,
    pub name: String,
    pub status: String,
    pub fabric: String,
    pub vrf: String,
    pub contract_name: String,
    pub security_group_name: String,
    pub security_group_id: Option<i64>,
    pub submitted_at: DateTime<Utc>,
    pub provisioned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Status enum for type-safe transitions
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Provisioning,
    Active,
    Deprovisioning,
    Completed,
    CleanupFailed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Provisioning => "provisioning",
            Self::Active => "active",
            Self::Deprovisioning => "deprovisioning",
            Self::Completed => "completed",
            Self::CleanupFailed => "cleanup_failed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "provisioning" => Some(Self::Provisioning),
            "active" => Some(Self::Active),
            "deprovisioning" => Some(Self::Deprovisioning),
            "completed" => Some(Self::Completed),
            "cleanup_failed" => Some(Self::CleanupFailed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Terminal jobs hold no allocations and are never touched again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (*self, next),
            (Pending, Provisioning)
                | (Provisioning, Active)
                | (Provisioning, Failed)
                | (Provisioning, CleanupFailed)
                | (Active, Deprovisioning)
                | (Active, CleanupFailed)
                | (Deprovisioning, Completed)
                | (Deprovisioning, CleanupFailed)
                | (CleanupFailed, Deprovisioning)
        )
    }
}

impl Job {
    pub fn status(&self) -> Option<JobStatus> {
        JobStatus::parse(&self.status)
    }

    pub async fn find_by_external_id(external_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE external_id = $1")
            .bind(external_id)
            .fetch_optional(pool)
            .await?;
        Ok(job)
    }

    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
        Ok(job)
    }

    pub async fn list(status: Option<JobStatus>, pool: &PgPool) -> Result<Vec<Self>> {
        let jobs = match status {
            Some(status) => {
                sqlx::query_as::<_, Job>(
                    "SELECT * FROM jobs WHERE status = $1 ORDER BY submitted_at DESC",
                )
                .bind(status.as_str())
                .fetch_all(pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, Job>("SELECT * FROM jobs ORDER BY submitted_at DESC")
                    .fetch_all(pool)
                    .await?
            }
        };
        Ok(jobs)
    }

    /// Jobs the expiry sweeper should reclaim.
    pub async fn list_expired(now: DateTime<Utc>, pool: &PgPool) -> Result<Vec<Self>> {
        let jobs = sqlx::query_as::<_, Job>(
            r#"
            SELECT * FROM jobs
            WHERE status IN ('active', 'cleanup_failed')
              AND expires_at IS NOT NULL
              AND expires_at < $1
            ORDER BY expires_at
            "#,
        )
        .bind(now)
        .fetch_all(pool)
        .await?;
        Ok(jobs)
    }

    /// Insert the job row inside the admission transaction.
    pub async fn insert(&self, tx: &mut Transaction<'_, Postgres>) -> Result<Self> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            INSERT INTO jobs (
                id, external_id, name, status, fabric, vrf, contract_name,
                security_group_name, security_group_id, submitted_at, expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING *
            "#,
        )
        .bind(self.id)
        .bind(&self.external_id)
        .bind(&self.name)
        .bind(&self.status)
        .bind(&self.fabric)
        .bind(&self.vrf)
        .bind(&self.contract_name)
        .bind(&self.security_group_name)
        .bind(self.security_group_id)
        .bind(self.submitted_at)
        .bind(self.expires_at)
        .fetch_one(&mut **tx)
        .await?;
        Ok(job)
    }

    pub async fn set_status(
        id: Uuid,
        status: JobStatus,
        error: Option<&str>,
        pool: &PgPool,
    ) -> Result<Self> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = $2, error = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .bind(error)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    /// Activation after a successful deploy.
    pub async fn mark_active(id: Uuid, security_group_id: i64, pool: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'active',
                security_group_id = $2,
                provisioned_at = NOW(),
                error = NULL
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(security_group_id)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    /// Deploy failed after the security objects were created: keep them and
    /// the allocations for reconciliation.
    pub async fn mark_cleanup_failed(
        id: Uuid,
        security_group_id: Option<i64>,
        error: &str,
        pool: &PgPool,
    ) -> Result<Self> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'cleanup_failed',
                security_group_id = COALESCE($2, security_group_id),
                error = $3
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(security_group_id)
        .bind(error)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    pub async fn mark_completed(id: Uuid, pool: &PgPool) -> Result<Self> {
        let job = sqlx::query_as::<_, Job>(
            r#"
            UPDATE jobs
            SET status = 'completed',
                completed_at = NOW(),
                error = NULL
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .fetch_one(pool)
        .await?;
        Ok(job)
    }

    pub async fn add_compute_nodes(
        job_id: Uuid,
        node_ids: &[Uuid],
        tx: &mut Transaction<'_, Postgres>,
    ) -> Result<()> {
        for node_id in node_ids {
            sqlx::query("INSERT INTO job_compute_nodes (job_id, node_id) VALUES ($1, $2)")
                .bind(job_id)
                .bind(node_id)
                .execute(&mut **tx)
                .await?;
        }
        Ok(())
    }

    pub async fn node_ids(job_id: Uuid, pool: &PgPool) -> Result<Vec<Uuid>> {
        let rows: Vec<(Uuid,)> =
            sqlx::query_as("SELECT node_id FROM job_compute_nodes WHERE job_id = $1")
                .bind(job_id)
                .fetch_all(pool)
                .await?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }
}

//! Valkey-backed implementation of [`BaseCache`].
//!
//! Every operation runs under a short deadline so a slow or partitioned
//! cache can never stall a provisioning pipeline; callers absorb cache
//! errors except where a lease is required for single-flight. Lease release
//! and extension are holder-checked server-side (Lua) so a late releaser
//! cannot free a lease someone else has since acquired.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::traits::{BaseCache, LeaseAcquisition};

/// Outer deadline for any single cache operation.
const CACHE_OP_TIMEOUT: Duration = Duration::from_secs(2);

/// Keys removed per SCAN page during pattern invalidation.
const SCAN_PAGE: usize = 100;

const RELEASE_IF_HOLDER: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("DEL", KEYS[1])
else
    return 0
end
"#;

const EXTEND_IF_HOLDER: &str = r#"
if redis.call("GET", KEYS[1]) == ARGV[1] then
    return redis.call("PEXPIRE", KEYS[1], ARGV[2])
else
    return 0
end
"#;

pub struct ValkeyCache {
    manager: ConnectionManager,
}

impl ValkeyCache {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid Valkey URL")?;
        let manager = tokio::time::timeout(CACHE_OP_TIMEOUT, client.get_connection_manager())
            .await
            .context("timed out connecting to Valkey")?
            .context("failed to connect to Valkey")?;
        Ok(Self { manager })
    }

    async fn deadline<T>(
        &self,
        what: &str,
        fut: impl std::future::Future<Output = redis::RedisResult<T>>,
    ) -> Result<T> {
        tokio::time::timeout(CACHE_OP_TIMEOUT, fut)
            .await
            .with_context(|| format!("cache {} timed out", what))?
            .with_context(|| format!("cache {} failed", what))
    }
}

#[async_trait]
impl BaseCache for ValkeyCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        self.deadline("get", conn.get(key)).await
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.manager.clone();
        let ttl_secs = ttl.as_secs().max(1);
        self.deadline("set", conn.set_ex(key, value, ttl_secs)).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        let _: i64 = self.deadline("delete", conn.del(key)).await?;
        Ok(())
    }

    async fn invalidate_pattern(&self, pattern: &str) -> Result<u64> {
        let mut conn = self.manager.clone();
        let mut cursor: u64 = 0;
        let mut removed: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = self
                .deadline(
                    "scan",
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_PAGE)
                        .query_async(&mut conn),
                )
                .await?;
            if !keys.is_empty() {
                let deleted: i64 = self.deadline("delete", conn.del(&keys)).await?;
                removed += deleted as u64;
            }
            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(removed)
    }

    async fn acquire_lease(
        &self,
        key: &str,
        holder: &str,
        ttl: Duration,
    ) -> Result<LeaseAcquisition> {
        let mut conn = self.manager.clone();
        let reply: Option<String> = self
            .deadline(
                "lease acquire",
                redis::cmd("SET")
                    .arg(key)
                    .arg(holder)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl.as_millis() as u64)
                    .query_async(&mut conn),
            )
            .await?;
        Ok(match reply {
            Some(_) => LeaseAcquisition::Acquired,
            None => LeaseAcquisition::AlreadyHeld,
        })
    }

    async fn extend_lease(&self, key: &str, holder: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.manager.clone();
        let script = redis::Script::new(EXTEND_IF_HOLDER);
        let extended: i64 = self
            .deadline(
                "lease extend",
                script
                    .key(key)
                    .arg(holder)
                    .arg(ttl.as_millis() as u64)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(extended == 1)
    }

    async fn release_lease(&self, key: &str, holder: &str) -> Result<bool> {
        let mut conn = self.manager.clone();
        let script = redis::Script::new(RELEASE_IF_HOLDER);
        let released: i64 = self
            .deadline(
                "lease release",
                script.key(key).arg(holder).invoke_async(&mut conn),
            )
            .await?;
        Ok(released == 1)
    }
}

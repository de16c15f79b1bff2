use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use dotenvy::dotenv;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub server_port: u16,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub fabric: FabricConfig,
    pub jobs: JobSettings,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,
    pub sslmode: String,
    /// Raise sqlx's log level to debug when set.
    pub log_sql: bool,
    pub max_open_conns: u32,
    pub max_idle_conns: u32,
    pub conn_max_lifetime: Duration,
}

impl DatabaseConfig {
    pub fn url(&self) -> String {
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            self.user, self.password, self.host, self.port, self.name, self.sslmode
        )
    }
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub address: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub db: i64,
}

impl CacheConfig {
    pub fn url(&self) -> String {
        let auth = match (&self.username, &self.password) {
            (Some(user), Some(pass)) => format!("{}:{}@", user, pass),
            (None, Some(pass)) => format!(":{}@", pass),
            _ => String::new(),
        };
        format!("redis://{}{}/{}", auth, self.address, self.db)
    }
}

#[derive(Debug, Clone)]
pub struct FabricConfig {
    pub base_url: String,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Takes priority over username/password when set.
    pub api_key: Option<String>,
    pub insecure: bool,
    /// The fabric this controller provisions compute jobs into.
    pub fabric_name: String,
    pub vrf_name: String,
    pub network_name: String,
    pub access_vlan: u16,
    pub contract_prefix: String,
    /// 0 disables the periodic inventory sync.
    pub sync_interval_hours: u64,
}

#[derive(Debug, Clone)]
pub struct JobSettings {
    /// How long a job may stay active before the expiry sweeper reclaims it.
    pub default_ttl: Duration,
    /// Outer deadline for one provisioning pipeline run.
    pub provision_timeout: Duration,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present (development)
        let _ = dotenv();

        Ok(Self {
            server_port: parse_var("SERVER_PORT", 8080)?,
            database: DatabaseConfig {
                host: env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
                port: parse_var("DB_PORT", 5432)?,
                user: env::var("DB_USER").context("DB_USER must be set")?,
                password: env::var("DB_PASSWORD").context("DB_PASSWORD must be set")?,
                name: env::var("DB_NAME").context("DB_NAME must be set")?,
                sslmode: env::var("DB_SSLMODE").unwrap_or_else(|_| "disable".to_string()),
                log_sql: bool_var("DB_LOG_SQL"),
                max_open_conns: parse_var("DB_MAX_OPEN_CONNS", 25)?,
                max_idle_conns: parse_var("DB_MAX_IDLE_CONNS", 5)?,
                conn_max_lifetime: Duration::from_secs(
                    parse_var::<u64>("DB_CONN_MAX_LIFETIME", 30)? * 60,
                ),
            },
            cache: CacheConfig {
                address: env::var("VALKEY_ADDRESS")
                    .unwrap_or_else(|_| "localhost:6379".to_string()),
                username: env::var("VALKEY_USERNAME").ok().filter(|v| !v.is_empty()),
                password: env::var("VALKEY_PASSWORD").ok().filter(|v| !v.is_empty()),
                db: parse_var("VALKEY_DB", 0)?,
            },
            fabric: FabricConfig {
                base_url: env::var("ND_BASE_URL").context("ND_BASE_URL must be set")?,
                username: env::var("ND_USERNAME").ok().filter(|v| !v.is_empty()),
                password: env::var("ND_PASSWORD").ok().filter(|v| !v.is_empty()),
                api_key: env::var("ND_API_KEY").ok().filter(|v| !v.is_empty()),
                insecure: bool_var("ND_INSECURE"),
                fabric_name: env::var("ND_COMPUTE_FABRIC_NAME")
                    .context("ND_COMPUTE_FABRIC_NAME must be set")?,
                vrf_name: env::var("ND_COMPUTE_VRF_NAME")
                    .context("ND_COMPUTE_VRF_NAME must be set")?,
                network_name: env::var("ND_COMPUTE_NETWORK_NAME")
                    .context("ND_COMPUTE_NETWORK_NAME must be set")?,
                access_vlan: parse_var("ND_COMPUTE_ACCESS_VLAN", 2301)?,
                contract_prefix: env::var("ND_COMPUTE_CONTRACT_PREFIX")
                    .unwrap_or_else(|_| "cc_".to_string()),
                sync_interval_hours: parse_var("ND_SYNC_INTERVAL_HOURS", 6)?,
            },
            jobs: JobSettings {
                default_ttl: Duration::from_secs(
                    parse_var::<u64>("JOB_DEFAULT_TTL_HOURS", 24)? * 3600,
                ),
                provision_timeout: Duration::from_secs(parse_var(
                    "PROVISION_TIMEOUT_SECS",
                    120,
                )?),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match env::var(key) {
        Ok(value) => value
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        Err(_) => Ok(default),
    }
}

fn bool_var(key: &str) -> bool {
    env::var(key)
        .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

//! Test harness with testcontainers for integration testing.
//!
//! A single Postgres container is shared across all tests; migrations run
//! once. Each test works with its own node names / external ids so tests
//! can share the schema without stepping on each other. The fabric manager
//! and the cache are the in-process doubles from `test_dependencies`.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use controller_core::config::{FabricConfig, JobSettings};
use controller_core::domains::inventory::{ComputeNode, Fabric, Switch, SwitchPort, SwitchPortUpsert};
use controller_core::domains::jobs::JobEngine;
use controller_core::kernel::test_dependencies::{InMemoryCache, MockFabricApi};
use controller_core::kernel::{DeployBatcher, ServerDeps};
use sqlx::PgPool;
use testcontainers::core::{ContainerPort, WaitFor};
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, GenericImage, ImageExt};
use tokio::sync::OnceCell;
use uuid::Uuid;

// =============================================================================
// Shared Test Infrastructure
// =============================================================================

struct SharedTestInfra {
    db_url: String,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<GenericImage>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = GenericImage::new("postgres", "16-alpine")
            .with_wait_for(WaitFor::message_on_stderr(
                "database system is ready to accept connections",
            ))
            .with_exposed_port(ContainerPort::Tcp(5432))
            .with_env_var("POSTGRES_PASSWORD", "postgres")
            .with_env_var("POSTGRES_USER", "postgres")
            .with_env_var("POSTGRES_DB", "postgres")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?;
        let port = postgres.get_host_port_ipv4(5432).await?;
        let db_url = format!("postgresql://postgres:postgres@{}:{}/postgres", host, port);

        // The readiness message can race the socket; retry briefly.
        let mut pool = None;
        for _ in 0..10 {
            match PgPool::connect(&db_url).await {
                Ok(connected) => {
                    pool = Some(connected);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(500)).await,
            }
        }
        let pool = pool.context("Failed to connect to Postgres")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("Failed to run migrations")?;

        Ok(Self {
            db_url,
            _postgres: postgres,
        })
    }

    async fn get() -> &'static Self {
        SHARED_INFRA
            .get_or_init(|| async {
                Self::init()
                    .await
                    .expect("Failed to initialize shared test infrastructure")
            })
            .await
    }
}

// =============================================================================
// Per-test context
// =============================================================================

pub struct TestContext {
    pub pool: PgPool,
    pub cache: Arc<InMemoryCache>,
    pub fabric_api: Arc<MockFabricApi>,
    pub deps: ServerDeps,
    pub engine: JobEngine,
}

pub async fn test_context() -> TestContext {
    let infra = SharedTestInfra::get().await;
    let pool = PgPool::connect(&infra.db_url)
        .await
        .expect("Failed to connect to shared Postgres");

    let cache = Arc::new(InMemoryCache::new());
    let fabric_api = Arc::new(MockFabricApi::new());

    // The compute network the engine validates against at admission.
    fabric_api.networks.lock().unwrap().push(ndfc::types::NdNetwork {
        network_name: "net_compute".to_string(),
        vrf: Some("vrf_compute".to_string()),
        network_template_config: Some(r#"{"vlanId": 2301}"#.to_string()),
    });

    let deps = ServerDeps {
        db_pool: pool.clone(),
        cache: cache.clone(),
        fabric: fabric_api.clone(),
        // A short window keeps tests fast without changing semantics.
        deploy: DeployBatcher::with_window(fabric_api.clone(), Duration::from_millis(25)),
        fabric_settings: FabricConfig {
            base_url: "https://nd.test".into(),
            username: None,
            password: None,
            api_key: Some("test-key".into()),
            insecure: false,
            fabric_name: "compute".into(),
            vrf_name: "vrf_compute".into(),
            network_name: "net_compute".into(),
            access_vlan: 2301,
            contract_prefix: "cc_".into(),
            sync_interval_hours: 6,
        },
        job_settings: JobSettings {
            default_ttl: Duration::from_secs(24 * 3600),
            provision_timeout: Duration::from_secs(30),
        },
    };

    TestContext {
        engine: JobEngine::new(deps.clone()),
        pool,
        cache,
        fabric_api,
        deps,
    }
}

// =============================================================================
// Seeding helpers
// =============================================================================

/// Create a node wired to one port of a (created-on-demand) switch.
/// Returns the node id.
pub async fn seed_node(
    pool: &PgPool,
    node_name: &str,
    switch_serial: &str,
    port_name: &str,
) -> Uuid {
    let fabric = Fabric::ensure("compute", Some("Switch_Fabric"), pool)
        .await
        .expect("seed fabric");
    let switch = Switch::upsert(
        &fabric.id,
        &format!("leaf-{}", switch_serial),
        switch_serial,
        Some("N9K-C93180YC-EX"),
        Some("10.0.0.10"),
        Some("leaf"),
        pool,
    )
    .await
    .expect("seed switch");

    let port = SwitchPortUpsert {
        switch_id: switch.id.clone(),
        name: port_name.to_string(),
        description: Some("compute downlink".to_string()),
        admin_state: Some("up".to_string()),
        speed: Some("25G".to_string()),
        last_seen_at: Utc::now(),
    };
    SwitchPort::upsert_batch(&[port], pool).await.expect("seed port");

    let node = ComputeNode {
        id: Uuid::new_v4(),
        name: node_name.to_string(),
        hostname: Some(format!("{}.compute.internal", node_name)),
        ip: None,
        mac: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };
    let node = node.insert(pool).await.expect("seed node");

    let port_id = SwitchPort::deterministic_id(&switch.id, port_name);
    ComputeNode::add_port_mapping(node.id, &port_id, "eth0", pool)
        .await
        .expect("seed port mapping");

    node.id
}

/// Count allocation rows currently held by a job.
pub async fn allocation_count(pool: &PgPool, job_id: Uuid) -> i64 {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM compute_node_allocations WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(pool)
            .await
            .expect("count allocations");
    count
}

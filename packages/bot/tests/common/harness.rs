//! Test harness with testcontainers for integration testing.
//!
//! One Postgres container is shared by every test in the binary. Each harness
//! gets its own freshly created database, so schema tests never see rows or
//! constraints left by another test.

use anyhow::{Context, Result};
use bot_core::domains::storage::PostgresStore;
use sqlx::postgres::{PgConnectOptions, PgPool};
use test_context::AsyncTestContext;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared test infrastructure that persists across all tests.
struct SharedTestInfra {
    options: PgConnectOptions,
    // Keep the container alive for the entire test run
    _postgres: ContainerAsync<Postgres>,
}

static SHARED_INFRA: OnceCell<SharedTestInfra> = OnceCell::const_new();

impl SharedTestInfra {
    async fn init() -> Result<Self> {
        // Run tests with: RUST_LOG=debug cargo test -- --nocapture
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();

        let postgres = Postgres::default()
            .with_tag("16")
            .start()
            .await
            .context("Failed to start Postgres container")?;

        let host = postgres.get_host().await?.to_string();
        let port = postgres.get_host_port_ipv4(5432).await?;

        let options = PgConnectOptions::new()
            .host(&host)
            .port(port)
            .username("postgres")
            .password("postgres")
            .database("postgres");

        Ok(Self {
            options,
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

/// Per-test database on the shared container.
///
/// ```ignore
/// #[test_context(TestHarness)]
/// #[tokio::test]
/// async fn my_test(ctx: &mut TestHarness) {
///     let store = ctx.store().await;
/// }
/// ```
pub struct TestHarness {
    /// Connect options for this test's database
    pub options: PgConnectOptions,
    /// Raw pool for fixtures and assertions outside the store
    pub db_pool: PgPool,
}

impl AsyncTestContext for TestHarness {
    async fn setup() -> Self {
        Self::new().await.expect("Failed to create test harness")
    }

    async fn teardown(self) {
        self.db_pool.close().await;
    }
}

impl TestHarness {
    pub async fn new() -> Result<Self> {
        let infra = SharedTestInfra::get().await;

        let name = format!("bot_test_{}", rand::random::<u32>());
        let admin = PgPool::connect_with(infra.options.clone())
            .await
            .context("Failed to connect to test server")?;
        sqlx::query(&format!("CREATE DATABASE {}", name))
            .execute(&admin)
            .await
            .context("Failed to create test database")?;
        admin.close().await;

        let options = infra.options.clone().database(&name);
        let db_pool = PgPool::connect_with(options.clone())
            .await
            .context("Failed to connect to test database")?;

        Ok(Self { options, db_pool })
    }

    /// Connect a store to this test's database (runs schema bootstrap).
    pub async fn store(&self) -> PostgresStore {
        PostgresStore::connect(self.options.clone())
            .await
            .expect("Failed to connect store")
    }
}

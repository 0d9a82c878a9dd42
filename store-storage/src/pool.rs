//! Connection pool construction and migration running.

use diesel::{Connection, PgConnection};
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    AsyncPgConnection,
};
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use tracing::info;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("./migrations");

/// Dependency-injected configuration for the DAL (spec.md §9 "replace
/// global singletons with dependency-injected components"; `spec.md` §1
/// places config-file loading itself out of scope, so this struct is built
/// by the caller rather than parsed from a file here).
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub database_url: String,
    pub max_pool_size: usize,
    /// Upper bound on the number of rows a single `writeBatch` may touch
    /// before it is rejected as `InvalidRequest` (not in spec.md, an
    /// operational guard consistent with §5's bounded-resource model).
    /// `connect` only builds the pool; pass this through to
    /// `MetadataGateway::with_max_batch_items` to have it actually enforced.
    pub max_batch_items: usize,
}

impl StorageConfig {
    pub const DEFAULT_MAX_BATCH_ITEMS: usize = 1_000;

    pub fn new(database_url: impl Into<String>) -> Self {
        StorageConfig { database_url: database_url.into(), max_pool_size: 10, max_batch_items: Self::DEFAULT_MAX_BATCH_ITEMS }
    }
}

pub async fn connect(config: &StorageConfig) -> anyhow::Result<Pool<AsyncPgConnection>> {
    run_migrations(&config.database_url)?;
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(&config.database_url);
    let pool = Pool::builder(manager).max_size(config.max_pool_size).build()?;
    Ok(pool)
}

fn run_migrations(database_url: &str) -> anyhow::Result<()> {
    info!("running pending migrations");
    let mut conn = PgConnection::establish(database_url)?;
    conn.run_pending_migrations(MIGRATIONS)
        .map_err(|e| anyhow::anyhow!("migrations failed: {e}"))?;
    Ok(())
}

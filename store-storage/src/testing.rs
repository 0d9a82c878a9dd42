//! Reusable components to write tests against the DB.

use std::future::Future;

use diesel::sql_query;
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    AsyncPgConnection, RunQueryDsl,
};

async fn setup_pool() -> Pool<AsyncPgConnection> {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for testing");
    let config = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    Pool::builder(config).build().expect("failed to build test connection pool")
}

async fn teardown(conn: &mut AsyncPgConnection) {
    // child tables first so FKs cascade cleanly.
    let tables = ["tag_attr", "tag", "object_version", "config_entry", "object", "tenant"];
    for t in tables {
        sql_query(format!("DELETE FROM {t};")).execute(conn).await.unwrap_or_else(|_| panic!("error truncating {t} table"));
    }
}

/// Runs tests that need to commit data to the DB rather than rely on a test
/// transaction (the latter is preferred where possible; this is the
/// fallback for setups too complex for `begin_test_transaction`). Purges
/// every table afterwards so the next test starts from a clean slate.
///
/// While this function runs the db actually contains data, which interferes
/// with anything else touching it concurrently — name tests using this
/// helper so they land in a serial test group.
pub async fn run_against_db<F, Fut>(test_f: F)
where
    F: FnOnce(Pool<AsyncPgConnection>) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    let pool = setup_pool().await;
    let inner_pool = pool.clone();
    let res = tokio::spawn(async move {
        test_f(inner_pool).await;
    })
    .await;

    let mut conn = pool.get().await.expect("failed to acquire a connection from the pool");
    teardown(&mut conn).await;
    res.unwrap();
}

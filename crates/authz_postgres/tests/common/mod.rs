//! Isolated test database helpers.
//!
//! Each test creates a temporary database via CREATE DATABASE, applies the
//! workspace migrations into it, and drops it on cleanup.

#![allow(dead_code)]

use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    PgPool,
};
use std::path::Path;
use std::str::FromStr;

/// A throwaway database with the authz schema applied.
pub struct IsolatedDb {
    /// Pool on the throwaway database; hand this to the store under test.
    pub pool: PgPool,
    /// Generated `authz_test_<uuid>` name, dropped by [`drop_db`].
    pub dbname: String,
    /// Connection to the server's admin database, kept for the final DROP.
    admin: PgPool,
}

/// Admin URL for tests: `DATABASE_URL`, falling back to the local socket.
pub fn admin_url() -> String {
    let _ = dotenvy::dotenv();
    std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgresql:///postgres".into())
}

/// Create a fresh database on the `admin_url()` server and apply every
/// `migrations/*.sql` file to it in filename order.
pub async fn isolated_db() -> IsolatedDb {
    let admin_url = admin_url();
    let dbname = format!("authz_test_{}", uuid::Uuid::new_v4().simple());

    let admin_opts = PgConnectOptions::from_str(&admin_url).expect("admin_url parse failed");
    let admin = PgPoolOptions::new()
        .max_connections(1)
        .connect_with(admin_opts)
        .await
        .expect("admin connect failed");

    sqlx::query(&format!(r#"CREATE DATABASE "{}""#, dbname))
        .execute(&admin)
        .await
        .expect("CREATE DATABASE failed");

    let test_opts = PgConnectOptions::from_str(&admin_url)
        .expect("admin_url parse failed")
        .database(&dbname);

    let pool = PgPoolOptions::new()
        .max_connections(8)
        .connect_with(test_opts)
        .await
        .expect("test db connect failed");

    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    run_migrations(&pool, &migrations_dir).await;

    IsolatedDb {
        pool,
        dbname,
        admin,
    }
}

async fn run_migrations(pool: &PgPool, dir: &Path) {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap_or_else(|e| panic!("cannot read migrations dir {:?}: {}", dir, e))
        .filter_map(|entry| {
            let entry = entry.ok()?;
            let name = entry.file_name().to_string_lossy().to_string();
            name.ends_with(".sql").then(|| (name, entry.path()))
        })
        .collect();

    files.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, path) in &files {
        let sql = std::fs::read_to_string(path)
            .unwrap_or_else(|e| panic!("cannot read migration {}: {}", name, e));
        sqlx::raw_sql(&sql)
            .execute(pool)
            .await
            .unwrap_or_else(|e| panic!("migration {} failed: {}", name, e));
    }
}

/// Drop the isolated test database. Call this in cleanup, even on failure.
pub async fn drop_db(iso: IsolatedDb) {
    iso.pool.close().await;

    let drop_sql = format!(r#"DROP DATABASE IF EXISTS "{}" WITH (FORCE)"#, iso.dbname);
    let _ = sqlx::query(&drop_sql).execute(&iso.admin).await;

    iso.admin.close().await;
}

//! authz: seeds a small policy into Postgres and evaluates it for one user.
//!
//! Expects the schema from `migrations/` to be applied. See `config.rs` for
//! the environment variables it reads.

mod config;

use authz_core::{AuthzError, PolicyStore};
use authz_postgres::PgPolicyStore;
use sqlx::postgres::PgPoolOptions;

use crate::config::AuthzConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,authz=debug".into()),
        )
        .init();

    let config = AuthzConfig::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    tracing::info!("Connected to database");

    let mut store = PgPolicyStore::new(pool.clone()).with_span(tracing::info_span!("authz"));
    if let Some(timeout) = config.operation_timeout {
        store = store.with_operation_timeout(timeout);
    }

    let group_id = match store.create_group("new_group").await {
        Ok(id) => id,
        Err(AuthzError::NameExists(_)) => {
            // rerun against an already-seeded database
            existing_id(&pool, "groups", "new_group").await?
        }
        Err(e) => return Err(e.into()),
    };

    let permission_id = match store.create_permission("new_permission").await {
        Ok(id) => id,
        Err(AuthzError::NameExists(_)) => {
            existing_id(&pool, "permissions", "new_permission").await?
        }
        Err(e) => return Err(e.into()),
    };

    let version = store
        .update_group_permissions(group_id, &[permission_id])
        .await?;
    tracing::info!(group_id, version, "group permissions updated successfully");

    store
        .update_user_groups(&config.demo_user, &[group_id])
        .await?;

    let policy = store.read_policy().await?;
    let result = policy.evaluate(&config.demo_user)?;
    tracing::info!(
        user = %config.demo_user,
        groups = ?result.groups,
        permissions = ?result.permissions,
        "policy evaluated"
    );

    pool.close().await;
    Ok(())
}

async fn existing_id(pool: &sqlx::PgPool, table: &str, name: &str) -> anyhow::Result<i32> {
    let id = sqlx::query_scalar::<_, i32>(&format!("SELECT id FROM {table} WHERE name = $1"))
        .bind(name)
        .fetch_one(pool)
        .await?;
    Ok(id)
}

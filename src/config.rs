//! Environment-driven configuration for the `authz` binary.
//!
//!   AUTHZ_DATABASE_URL         Postgres connection string (required)
//!   AUTHZ_MAX_CONNECTIONS      pool size (default: 10)
//!   AUTHZ_OPERATION_TIMEOUT_MS per-operation deadline, 0 disables (default: 5000)
//!   AUTHZ_DEMO_USER            user evaluated after seeding (default: demo-user)

use std::time::Duration;

use anyhow::{Context, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthzConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub operation_timeout: Option<Duration>,
    pub demo_user: String,
}

impl AuthzConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let database_url = lookup("AUTHZ_DATABASE_URL").context("AUTHZ_DATABASE_URL must be set")?;

        let max_connections = match lookup("AUTHZ_MAX_CONNECTIONS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid AUTHZ_MAX_CONNECTIONS: {v:?}"))?,
            None => 10,
        };

        let timeout_ms: u64 = match lookup("AUTHZ_OPERATION_TIMEOUT_MS") {
            Some(v) => v
                .parse()
                .with_context(|| format!("invalid AUTHZ_OPERATION_TIMEOUT_MS: {v:?}"))?,
            None => 5000,
        };

        let demo_user = lookup("AUTHZ_DEMO_USER").unwrap_or_else(|| "demo-user".into());

        Ok(Self {
            database_url,
            max_connections,
            operation_timeout: (timeout_ms > 0).then(|| Duration::from_millis(timeout_ms)),
            demo_user,
        })
    }
}

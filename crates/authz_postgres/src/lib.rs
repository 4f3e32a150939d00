//! authz_postgres: Postgres adapter for the `PolicyStore` port.
//!
//! Expects the schema in `migrations/001_authz_schema.sql`: `groups` and
//! `permissions` (unique names, per-row `version`), plus the `subjects` and
//! `group_permissions` edge tables with cascading foreign keys.

mod errors;
pub mod store;

pub use store::PgPolicyStore;

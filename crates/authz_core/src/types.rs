//! Identity and version types shared by the store port and its adapters.
//!
//! These mirror the Postgres `INT` columns of the schema.

pub type GroupId = i32;
pub type PermissionId = i32;

/// Optimistic-concurrency counter on a group row. Starts at 1 on create.
pub type Version = i32;

pub const INITIAL_VERSION: Version = 1;

//! Storage port for the policy store.
//! Implemented by authz_postgres (and by `MemoryPolicyStore` in this crate).

use async_trait::async_trait;

use crate::error::Result;
use crate::policy::Policy;
use crate::types::{GroupId, PermissionId, Version};

/// Durable, concurrency-safe CRUD over groups, permissions, memberships and
/// grants.
///
/// Every group-centric mutation is protected by the group's version: the
/// `*_at` methods take the version the caller last observed and fail with
/// `AuthzError::Concurrency` if another writer has moved it on. The plain
/// forms read the current version first and then apply the `*_at` form.
/// Nothing is retried automatically.
///
/// Edge updates merge to match: after `update_group_users(g, [a, b])` the
/// membership of `g` is exactly `{a, b}`.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    // ── Create ─────────────────────────────────────────────────

    /// Insert a group at version 1. Fails with `NameExists` on a duplicate.
    async fn create_group(&self, name: &str) -> Result<GroupId>;

    /// Insert a permission at version 1. Fails with `NameExists` on a duplicate.
    async fn create_permission(&self, name: &str) -> Result<PermissionId>;

    // ── Versioned group mutations ──────────────────────────────

    /// Current version of a group, or `GroupNotFound`.
    async fn group_version(&self, group_id: GroupId) -> Result<Version>;

    /// Merge the group's grants to exactly `permissions` and bump its version.
    /// Returns the new version.
    async fn update_group_permissions_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        permissions: &[PermissionId],
    ) -> Result<Version>;

    /// Merge the group's members to exactly `users` and bump its version.
    /// Returns the new version.
    async fn update_group_users_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        users: &[String],
    ) -> Result<Version>;

    /// Rename the group and bump its version. Returns the new version.
    async fn change_group_name_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        new_name: &str,
    ) -> Result<Version>;

    /// Delete the group (and, by cascade, its edges) if still at `expected_version`.
    async fn delete_group_at(&self, group_id: GroupId, expected_version: Version) -> Result<()>;

    // ── User-side mutations (unversioned) ──────────────────────

    /// Merge the user's memberships to exactly `groups`.
    ///
    /// Users have no row of their own, so this is not version-checked and
    /// does not bump any group version.
    async fn update_user_groups(&self, user_id: &str, groups: &[GroupId]) -> Result<()>;

    /// Delete every membership of `user_id`. Returns the number removed, or
    /// `NoUserRecordsDeleted` if there were none.
    async fn delete_user(&self, user_id: &str) -> Result<u64>;

    // ── Read ───────────────────────────────────────────────────

    /// Full denormalized snapshot of every group and permission.
    async fn read_policy(&self) -> Result<Policy>;

    // ── Provided: read version, then apply ─────────────────────

    async fn update_group_permissions(
        &self,
        group_id: GroupId,
        permissions: &[PermissionId],
    ) -> Result<Version> {
        let version = self.group_version(group_id).await?;
        self.update_group_permissions_at(group_id, version, permissions)
            .await
    }

    async fn update_group_users(&self, group_id: GroupId, users: &[String]) -> Result<Version> {
        let version = self.group_version(group_id).await?;
        self.update_group_users_at(group_id, version, users).await
    }

    async fn change_group_name(&self, group_id: GroupId, new_name: &str) -> Result<Version> {
        let version = self.group_version(group_id).await?;
        self.change_group_name_at(group_id, version, new_name).await
    }

    async fn delete_group(&self, group_id: GroupId) -> Result<()> {
        let version = self.group_version(group_id).await?;
        self.delete_group_at(group_id, version).await
    }
}

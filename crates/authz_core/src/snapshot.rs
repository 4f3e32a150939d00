//! Row-to-snapshot reconstruction.
//!
//! Store adapters read two flat, outer-joined row sets (group/member and
//! permission/group) and fold them into a `Policy`. A row whose companion
//! column is null records the entity with an empty collection.

use std::collections::BTreeMap;

use crate::group::Group;
use crate::permission::Permission;
use crate::policy::Policy;

#[derive(Debug, Default)]
pub struct PolicySnapshotBuilder {
    groups: BTreeMap<String, Vec<String>>,
    permissions: BTreeMap<String, Vec<String>>,
}

impl PolicySnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// One `(group_name, user_id?)` row.
    pub fn add_group_row(&mut self, group_name: String, user_id: Option<String>) {
        let users = self.groups.entry(group_name).or_default();
        if let Some(user_id) = user_id {
            users.push(user_id);
        }
    }

    /// One `(permission_name, group_name?)` row.
    pub fn add_permission_row(&mut self, permission_name: String, group_name: Option<String>) {
        let groups = self.permissions.entry(permission_name).or_default();
        if let Some(group_name) = group_name {
            groups.push(group_name);
        }
    }

    /// Entities come out ordered by name, and so do their members, so the
    /// snapshot does not depend on row order.
    pub fn build(self) -> Policy {
        let groups = self
            .groups
            .into_iter()
            .map(|(name, mut users)| {
                users.sort();
                users.dedup();
                Group::new(name, users)
            })
            .collect();

        let permissions = self
            .permissions
            .into_iter()
            .map(|(name, mut groups)| {
                groups.sort();
                groups.dedup();
                Permission::new(name, groups)
            })
            .collect();

        Policy::new(permissions, groups)
    }
}

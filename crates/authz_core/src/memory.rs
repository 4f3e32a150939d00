//! In-process `PolicyStore`.
//!
//! Same contract as the Postgres adapter (unique names, per-group versions,
//! merge-to-match edges, cascading deletes) behind a single `RwLock`. Each
//! operation validates everything before touching state, so a failed call
//! leaves nothing half-applied. Used by tests and by embedders that do not
//! need durability.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{AuthzError, Result};
use crate::policy::Policy;
use crate::ports::PolicyStore;
use crate::snapshot::PolicySnapshotBuilder;
use crate::types::{GroupId, PermissionId, Version, INITIAL_VERSION};

#[derive(Debug)]
struct Row {
    name: String,
    version: Version,
}

#[derive(Debug, Default)]
struct State {
    last_group_id: GroupId,
    last_permission_id: PermissionId,
    groups: BTreeMap<GroupId, Row>,
    permissions: BTreeMap<PermissionId, Row>,
    /// (user_id, group_id)
    subjects: BTreeSet<(String, GroupId)>,
    /// (group_id, permission_id)
    grants: BTreeSet<(GroupId, PermissionId)>,
}

impl State {
    fn group_name_taken(&self, name: &str, except: Option<GroupId>) -> bool {
        self.groups
            .iter()
            .any(|(id, row)| row.name == name && Some(*id) != except)
    }

    /// Bump the version if it still matches, like
    /// `UPDATE groups SET version = version + 1 WHERE id = $1 AND version = $2`.
    fn bump_version(&mut self, group_id: GroupId, expected_version: Version) -> Result<Version> {
        match self.groups.get_mut(&group_id) {
            Some(row) if row.version == expected_version => {
                row.version += 1;
                Ok(row.version)
            }
            _ => Err(AuthzError::Concurrency {
                group_id,
                expected_version,
            }),
        }
    }

    fn check_version(&self, group_id: GroupId, expected_version: Version) -> Result<()> {
        match self.groups.get(&group_id) {
            Some(row) if row.version == expected_version => Ok(()),
            _ => Err(AuthzError::Concurrency {
                group_id,
                expected_version,
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    state: RwLock<State>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn create_group(&self, name: &str) -> Result<GroupId> {
        let mut state = self.state.write().await;
        if state.group_name_taken(name, None) {
            return Err(AuthzError::NameExists(name.to_string()));
        }

        state.last_group_id += 1;
        let id = state.last_group_id;
        state.groups.insert(
            id,
            Row {
                name: name.to_string(),
                version: INITIAL_VERSION,
            },
        );
        tracing::debug!(group_id = id, group_name = name, "group created");
        Ok(id)
    }

    async fn create_permission(&self, name: &str) -> Result<PermissionId> {
        let mut state = self.state.write().await;
        if state.permissions.values().any(|row| row.name == name) {
            return Err(AuthzError::NameExists(name.to_string()));
        }

        state.last_permission_id += 1;
        let id = state.last_permission_id;
        state.permissions.insert(
            id,
            Row {
                name: name.to_string(),
                version: INITIAL_VERSION,
            },
        );
        tracing::debug!(permission_id = id, permission_name = name, "permission created");
        Ok(id)
    }

    async fn group_version(&self, group_id: GroupId) -> Result<Version> {
        let state = self.state.read().await;
        state
            .groups
            .get(&group_id)
            .map(|row| row.version)
            .ok_or(AuthzError::GroupNotFound(group_id))
    }

    async fn update_group_permissions_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        permissions: &[PermissionId],
    ) -> Result<Version> {
        let mut state = self.state.write().await;

        if let Some(missing) = permissions
            .iter()
            .find(|id| !state.permissions.contains_key(*id))
        {
            return Err(AuthzError::Database(anyhow::anyhow!(
                "permission {missing} does not exist"
            )));
        }
        state.check_version(group_id, expected_version)?;

        let desired: HashSet<PermissionId> = permissions.iter().copied().collect();
        state
            .grants
            .retain(|(g, p)| *g != group_id || desired.contains(p));
        for permission_id in desired {
            state.grants.insert((group_id, permission_id));
        }

        state.bump_version(group_id, expected_version)
    }

    async fn update_group_users_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        users: &[String],
    ) -> Result<Version> {
        let mut state = self.state.write().await;
        state.check_version(group_id, expected_version)?;

        let desired: HashSet<&str> = users.iter().map(String::as_str).collect();
        state
            .subjects
            .retain(|(u, g)| *g != group_id || desired.contains(u.as_str()));
        for user_id in desired {
            state.subjects.insert((user_id.to_string(), group_id));
        }

        state.bump_version(group_id, expected_version)
    }

    async fn change_group_name_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        new_name: &str,
    ) -> Result<Version> {
        let mut state = self.state.write().await;
        state.check_version(group_id, expected_version)?;
        if state.group_name_taken(new_name, Some(group_id)) {
            return Err(AuthzError::NameExists(new_name.to_string()));
        }

        let version = state.bump_version(group_id, expected_version)?;
        if let Some(row) = state.groups.get_mut(&group_id) {
            row.name = new_name.to_string();
        }
        Ok(version)
    }

    async fn delete_group_at(&self, group_id: GroupId, expected_version: Version) -> Result<()> {
        let mut state = self.state.write().await;
        state.check_version(group_id, expected_version)?;

        state.groups.remove(&group_id);
        state.subjects.retain(|(_, g)| *g != group_id);
        state.grants.retain(|(g, _)| *g != group_id);
        Ok(())
    }

    async fn update_user_groups(&self, user_id: &str, groups: &[GroupId]) -> Result<()> {
        let mut state = self.state.write().await;

        if let Some(missing) = groups.iter().find(|id| !state.groups.contains_key(*id)) {
            return Err(AuthzError::Database(anyhow::anyhow!(
                "group {missing} does not exist"
            )));
        }

        let desired: HashSet<GroupId> = groups.iter().copied().collect();
        state
            .subjects
            .retain(|(u, g)| u != user_id || desired.contains(g));
        for group_id in desired {
            state.subjects.insert((user_id.to_string(), group_id));
        }
        Ok(())
    }

    async fn delete_user(&self, user_id: &str) -> Result<u64> {
        let mut state = self.state.write().await;
        let before = state.subjects.len();
        state.subjects.retain(|(u, _)| u != user_id);
        let removed = (before - state.subjects.len()) as u64;

        if removed == 0 {
            return Err(AuthzError::NoUserRecordsDeleted(user_id.to_string()));
        }
        Ok(removed)
    }

    async fn read_policy(&self) -> Result<Policy> {
        let state = self.state.read().await;
        let mut builder = PolicySnapshotBuilder::new();

        for (group_id, row) in &state.groups {
            let mut any = false;
            for (user_id, _) in state.subjects.iter().filter(|(_, g)| g == group_id) {
                builder.add_group_row(row.name.clone(), Some(user_id.clone()));
                any = true;
            }
            if !any {
                builder.add_group_row(row.name.clone(), None);
            }
        }

        for (permission_id, row) in &state.permissions {
            let mut any = false;
            for (group_id, _) in state.grants.iter().filter(|(_, p)| p == permission_id) {
                let group_name = state.groups.get(group_id).map(|g| g.name.clone());
                builder.add_permission_row(row.name.clone(), group_name);
                any = true;
            }
            if !any {
                builder.add_permission_row(row.name.clone(), None);
            }
        }

        Ok(builder.build())
    }
}

//! Policy snapshot and user evaluation.
//!
//! A `Policy` is a fully denormalized snapshot of every group and permission.
//! Evaluating a user is a pure function of the snapshot: first the groups the
//! user belongs to, then the permissions granted to any of those groups.

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};
use crate::group::Group;
use crate::permission::Permission;

/// The groups a user belongs to and the permissions those groups grant.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PolicyEvaluationResult {
    pub groups: Vec<String>,
    pub permissions: Vec<String>,
}

impl PolicyEvaluationResult {
    pub fn new(groups: Vec<String>, permissions: Vec<String>) -> Self {
        Self {
            groups,
            permissions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Policy {
    pub permissions: Vec<Permission>,
    pub groups: Vec<Group>,
}

impl Policy {
    pub fn new(permissions: Vec<Permission>, groups: Vec<Group>) -> Self {
        Self {
            permissions,
            groups,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.permissions.is_empty() && self.groups.is_empty()
    }

    pub fn group(&self, name: &str) -> Option<&Group> {
        self.groups.iter().find(|g| g.name == name)
    }

    pub fn permission(&self, name: &str) -> Option<&Permission> {
        self.permissions.iter().find(|p| p.name == name)
    }

    /// Evaluate `user` against the snapshot.
    ///
    /// Only an empty `user` is an error. A failure while evaluating a single
    /// group or permission counts as "not satisfied" for that element and
    /// never aborts the scan, so membership checks fail closed.
    pub fn evaluate(&self, user: &str) -> Result<PolicyEvaluationResult> {
        if user.is_empty() {
            return Err(AuthzError::EmptyUser);
        }

        let groups = select_satisfied(
            &self.groups,
            |group| group.evaluate(user),
            |group| group.name.clone(),
        );

        let permissions = select_satisfied(
            &self.permissions,
            |permission| permission.evaluate(Some(groups.as_slice())),
            |permission| permission.name.clone(),
        );

        Ok(PolicyEvaluationResult::new(groups, permissions))
    }

    pub fn is_in_group(&self, user: &str, group: &str) -> Result<bool> {
        let result = self.evaluate(user)?;
        Ok(result.groups.iter().any(|g| g == group))
    }

    pub fn has_permission(&self, user: &str, permission: &str) -> Result<bool> {
        let result = self.evaluate(user)?;
        Ok(result.permissions.iter().any(|p| p == permission))
    }
}

/// Keep the items whose predicate is `Ok(true)` and project them.
/// `Err` is treated the same as `Ok(false)`.
fn select_satisfied<T, R>(
    items: &[T],
    predicate: impl Fn(&T) -> Result<bool>,
    selector: impl Fn(&T) -> R,
) -> Vec<R> {
    items
        .iter()
        .filter(|item| predicate(*item).unwrap_or(false))
        .map(selector)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn admin_policy() -> Policy {
        Policy::new(
            vec![Permission::new("write", vec!["admin".into()])],
            vec![Group::new("admin", vec!["adminuser".into()])],
        )
    }

    fn layered_policy() -> Policy {
        Policy::new(
            vec![
                Permission::new("read", vec!["readers".into(), "admins".into()]),
                Permission::new("write", vec!["writers".into(), "admins".into()]),
                Permission::new("delete", vec!["admins".into()]),
                Permission::new("orphan", vec![]),
            ],
            vec![
                Group::new("readers", vec!["alice".into(), "bob".into()]),
                Group::new("writers", vec!["bob".into()]),
                Group::new("admins", vec!["carol".into()]),
            ],
        )
    }

    #[test]
    fn admin_user_gets_admin_group_and_write() {
        let result = admin_policy().evaluate("adminuser").unwrap();
        assert_eq!(result.groups, vec!["admin"]);
        assert_eq!(result.permissions, vec!["write"]);
    }

    #[test]
    fn unknown_user_gets_empty_collections() {
        let result = admin_policy().evaluate("unknown").unwrap();
        assert!(result.groups.is_empty());
        assert!(result.permissions.is_empty());
        assert_eq!(result, PolicyEvaluationResult::default());
    }

    #[test]
    fn empty_user_is_invalid_input() {
        let err = admin_policy().evaluate("").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn empty_policy_yields_empty_result() {
        let policy = Policy::default();
        assert!(policy.is_empty());
        let result = policy.evaluate("anyone").unwrap();
        assert!(result.groups.is_empty());
        assert!(result.permissions.is_empty());
    }

    #[test]
    fn groups_keep_policy_order() {
        let result = layered_policy().evaluate("bob").unwrap();
        assert_eq!(result.groups, vec!["readers", "writers"]);
        assert_eq!(result.permissions, vec!["read", "write"]);
    }

    #[test]
    fn permission_without_groups_is_never_granted() {
        let result = layered_policy().evaluate("carol").unwrap();
        assert_eq!(result.groups, vec!["admins"]);
        assert_eq!(result.permissions, vec!["read", "write", "delete"]);
    }

    #[test]
    fn is_in_group_and_has_permission() {
        let policy = layered_policy();
        assert!(policy.is_in_group("alice", "readers").unwrap());
        assert!(!policy.is_in_group("alice", "writers").unwrap());
        assert!(policy.has_permission("alice", "read").unwrap());
        assert!(!policy.has_permission("alice", "delete").unwrap());
        assert!(!policy.has_permission("alice", "no-such-permission").unwrap());
    }

    #[test]
    fn convenience_queries_reject_empty_user() {
        let policy = layered_policy();
        assert!(matches!(
            policy.is_in_group("", "readers"),
            Err(AuthzError::EmptyUser)
        ));
        assert!(matches!(
            policy.has_permission("", "read"),
            Err(AuthzError::EmptyUser)
        ));
    }

    #[test]
    fn lookup_by_name() {
        let policy = layered_policy();
        assert_eq!(policy.group("writers").unwrap().users, vec!["bob"]);
        assert_eq!(policy.permission("delete").unwrap().groups, vec!["admins"]);
        assert!(policy.group("nobody").is_none());
    }

    // Element failures are absorbed as non-matches rather than surfaced.
    #[test]
    fn element_errors_fail_closed() {
        let items = ["a", "b", "c"];
        let selected = select_satisfied(
            &items[..],
            |item| match *item {
                "a" => Ok(true),
                "b" => Err(AuthzError::EmptyUser),
                _ => Err(AuthzError::NilGroups),
            },
            |item| item.to_string(),
        );
        assert_eq!(selected, vec!["a"]);
    }

    #[test]
    fn all_element_errors_yield_empty_not_error() {
        let items = [1, 2, 3];
        let selected: Vec<i32> =
            select_satisfied(&items[..], |_| Err(AuthzError::NilGroups), |item| *item);
        assert!(selected.is_empty());
    }

    #[test]
    fn result_serializes_as_json() {
        let result = admin_policy().evaluate("adminuser").unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "groups": ["admin"], "permissions": ["write"] })
        );
    }
}

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};

/// A named permission and the groups it has been granted to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    pub groups: Vec<String>,
}

impl Permission {
    pub fn new(name: impl Into<String>, groups: Vec<String>) -> Self {
        Self {
            name: name.into(),
            groups,
        }
    }

    /// Whether any of `groups` has been granted this permission.
    ///
    /// `None` means there is no evaluation context at all and is rejected;
    /// `Some(&[])` is a user with no memberships and simply evaluates false.
    pub fn evaluate<S: AsRef<str>>(&self, groups: Option<&[S]>) -> Result<bool> {
        let groups = groups.ok_or(AuthzError::NilGroups)?;

        if groups.is_empty() {
            return Ok(false);
        }

        let granted: HashSet<&str> = self.groups.iter().map(String::as_str).collect();

        Ok(groups.iter().any(|g| granted.contains(g.as_ref())))
    }
}

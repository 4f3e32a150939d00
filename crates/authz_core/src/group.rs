use serde::{Deserialize, Serialize};

use crate::error::{AuthzError, Result};

/// A named group with the user ids that are its members.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Group {
    pub name: String,
    pub users: Vec<String>,
}

impl Group {
    pub fn new(name: impl Into<String>, users: Vec<String>) -> Self {
        Self {
            name: name.into(),
            users,
        }
    }

    /// Whether `user` is a member of this group.
    pub fn evaluate(&self, user: &str) -> Result<bool> {
        if user.is_empty() {
            return Err(AuthzError::EmptyUser);
        }

        Ok(self.users.iter().any(|u| u == user))
    }
}

//! authz_core: authorization policy domain.
//!
//! Pure evaluation engine (`Group`, `Permission`, `Policy`), the closed error
//! taxonomy, and the `PolicyStore` port trait. Storage adapters live in
//! separate crates; nothing here depends on sqlx.

pub mod error;
pub mod group;
pub mod memory;
pub mod permission;
pub mod policy;
pub mod ports;
pub mod snapshot;
pub mod types;

pub use error::{AuthzError, ErrorKind, Result};
pub use group::Group;
pub use memory::MemoryPolicyStore;
pub use permission::Permission;
pub use policy::{Policy, PolicyEvaluationResult};
pub use ports::PolicyStore;
pub use snapshot::PolicySnapshotBuilder;
pub use types::{GroupId, PermissionId, Version, INITIAL_VERSION};

//! Postgres implementation of the `PolicyStore` port.
//!
//! All SQL is runtime-checked (sqlx::query, not sqlx::query!) to avoid a
//! compile-time database requirement.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{Instrument, Span};

use authz_core::{
    AuthzError, GroupId, PermissionId, Policy, PolicySnapshotBuilder, PolicyStore, Result,
    Version,
};

use crate::errors::{database_error, name_write_error, stream_error, version_lookup_error};

/// Groups with their members, then permissions with their granted groups.
/// Sent as one simple-query batch; `kind` routes each row to its accumulator.
const READ_POLICY_BATCH: &str = r#"
    SELECT 'group'::text AS kind, g.name AS name, s.id AS member
    FROM groups g
    LEFT JOIN subjects s ON g.id = s.group_id;

    SELECT 'permission'::text AS kind, p.name AS name, g.name AS member
    FROM permissions p
    LEFT JOIN group_permissions gp ON p.id = gp.permission_id
    LEFT JOIN groups g ON g.id = gp.group_id;
"#;

/// Postgres-backed policy store.
///
/// Holds no state beyond the pool, so one instance can be shared by any
/// number of concurrent callers. Each operation runs in a child span of the
/// span given to [`PgPolicyStore::with_span`].
#[derive(Debug, Clone)]
pub struct PgPolicyStore {
    pool: PgPool,
    span: Span,
    operation_timeout: Option<Duration>,
}

impl PgPolicyStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            span: tracing::info_span!("policy_store"),
            operation_timeout: None,
        }
    }

    /// Parent span for every operation's log context.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Upper bound on the wall-clock time of each operation. An operation
    /// that runs past it is dropped, which rolls back any open transaction.
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn bounded<T>(&self, operation: impl Future<Output = Result<T>>) -> Result<T> {
        let Some(limit) = self.operation_timeout else {
            return operation.await;
        };

        match tokio::time::timeout(limit, operation).await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!(timeout = ?limit, "operation deadline exceeded");
                Err(AuthzError::Database(anyhow::anyhow!(
                    "operation deadline of {limit:?} exceeded"
                )))
            }
        }
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(database_error("failed to start transaction"))
    }

    async fn read_group_version(&self, group_id: GroupId) -> Result<Version> {
        sqlx::query_scalar::<_, i32>("SELECT version FROM groups WHERE id = $1")
            .bind(group_id)
            .fetch_one(&self.pool)
            .await
            .map_err(version_lookup_error(group_id))
    }
}

/// Commit on success; otherwise roll back and return the operation error.
/// A rollback failure is logged and dropped.
async fn finish<T>(tx: Transaction<'static, Postgres>, outcome: Result<T>) -> Result<T> {
    match outcome {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(database_error("failed to commit transaction"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                tracing::warn!(error = %rollback_err, "failed to rollback transaction");
            }
            Err(err)
        }
    }
}

/// Version-conditioned increment. Zero rows means another writer moved the
/// version (or removed the group) since it was read.
async fn bump_version(
    conn: &mut PgConnection,
    group_id: GroupId,
    expected_version: Version,
) -> Result<Version> {
    let new_version = sqlx::query_scalar::<_, i32>(
        "UPDATE groups SET version = version + 1 WHERE id = $1 AND version = $2 RETURNING version",
    )
    .bind(group_id)
    .bind(expected_version)
    .fetch_optional(&mut *conn)
    .await
    .map_err(database_error("failed to update group version"))?;

    new_version.ok_or_else(|| {
        tracing::error!("failed to update group version due to concurrency issue");
        AuthzError::Concurrency {
            group_id,
            expected_version,
        }
    })
}

fn fold_row(builder: &mut PolicySnapshotBuilder, row: &PgRow) -> std::result::Result<(), sqlx::Error> {
    let kind: String = row.try_get("kind")?;
    let name: String = row.try_get("name")?;
    let member: Option<String> = row.try_get("member")?;
    route_row(builder, &kind, name, member)
}

fn route_row(
    builder: &mut PolicySnapshotBuilder,
    kind: &str,
    name: String,
    member: Option<String>,
) -> std::result::Result<(), sqlx::Error> {
    match kind {
        "group" => builder.add_group_row(name, member),
        "permission" => builder.add_permission_row(name, member),
        other => {
            return Err(sqlx::Error::Decode(
                format!("unexpected policy row kind {other:?}").into(),
            ))
        }
    }
    Ok(())
}

#[async_trait]
impl PolicyStore for PgPolicyStore {
    async fn create_group(&self, name: &str) -> Result<GroupId> {
        let span = tracing::info_span!(parent: &self.span, "create_group", group_name = name);
        self.bounded(async {
            sqlx::query_scalar::<_, i32>(
                "INSERT INTO groups (name, version) VALUES ($1, 1) RETURNING id",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(name_write_error(name, "failed to create group"))
        })
        .instrument(span)
        .await
    }

    async fn create_permission(&self, name: &str) -> Result<PermissionId> {
        let span =
            tracing::info_span!(parent: &self.span, "create_permission", permission_name = name);
        self.bounded(async {
            sqlx::query_scalar::<_, i32>(
                "INSERT INTO permissions (name, version) VALUES ($1, 1) RETURNING id",
            )
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(name_write_error(name, "failed to create permission"))
        })
        .instrument(span)
        .await
    }

    async fn group_version(&self, group_id: GroupId) -> Result<Version> {
        let span = tracing::info_span!(parent: &self.span, "group_version", group_id);
        self.bounded(self.read_group_version(group_id))
            .instrument(span)
            .await
    }

    async fn update_group_permissions_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        permissions: &[PermissionId],
    ) -> Result<Version> {
        let span = tracing::info_span!(
            parent: &self.span,
            "update_group_permissions",
            group_id,
            expected_version
        );
        self.bounded(async {
            let mut tx = self.begin().await?;
            let outcome = async {
                sqlx::query(
                    r#"
                    WITH desired AS (
                        SELECT DISTINCT unnest($2::int[]) AS permission_id
                    ),
                    removed AS (
                        DELETE FROM group_permissions gp
                        WHERE gp.group_id = $1::int
                          AND NOT EXISTS (
                              SELECT 1 FROM desired d WHERE d.permission_id = gp.permission_id
                          )
                    )
                    INSERT INTO group_permissions (group_id, permission_id)
                    SELECT $1::int, d.permission_id FROM desired d
                    ON CONFLICT (group_id, permission_id) DO NOTHING
                    "#,
                )
                .bind(group_id)
                .bind(permissions)
                .execute(&mut *tx)
                .await
                .map_err(database_error("failed to merge group permissions"))?;

                bump_version(&mut *tx, group_id, expected_version).await
            }
            .await;
            finish(tx, outcome).await
        })
        .instrument(span)
        .await
    }

    async fn update_group_users_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        users: &[String],
    ) -> Result<Version> {
        let span = tracing::info_span!(
            parent: &self.span,
            "update_group_users",
            group_id,
            expected_version
        );
        self.bounded(async {
            let mut tx = self.begin().await?;
            let outcome = async {
                sqlx::query(
                    r#"
                    WITH desired AS (
                        SELECT DISTINCT unnest($2::text[]) AS user_id
                    ),
                    removed AS (
                        DELETE FROM subjects s
                        WHERE s.group_id = $1::int
                          AND NOT EXISTS (
                              SELECT 1 FROM desired d WHERE d.user_id = s.id
                          )
                    )
                    INSERT INTO subjects (id, group_id)
                    SELECT d.user_id, $1::int FROM desired d
                    ON CONFLICT (id, group_id) DO NOTHING
                    "#,
                )
                .bind(group_id)
                .bind(users)
                .execute(&mut *tx)
                .await
                .map_err(database_error("failed to merge group users"))?;

                bump_version(&mut *tx, group_id, expected_version).await
            }
            .await;
            finish(tx, outcome).await
        })
        .instrument(span)
        .await
    }

    async fn change_group_name_at(
        &self,
        group_id: GroupId,
        expected_version: Version,
        new_name: &str,
    ) -> Result<Version> {
        let span = tracing::info_span!(
            parent: &self.span,
            "change_group_name",
            group_id,
            expected_version,
            new_name
        );
        self.bounded(async {
            let new_version = sqlx::query_scalar::<_, i32>(
                r#"
                UPDATE groups SET name = $1, version = version + 1
                WHERE id = $2 AND version = $3
                RETURNING version
                "#,
            )
            .bind(new_name)
            .bind(group_id)
            .bind(expected_version)
            .fetch_optional(&self.pool)
            .await
            .map_err(name_write_error(new_name, "failed to update group name"))?;

            new_version.ok_or_else(|| {
                tracing::error!("failed to update group name due to concurrency issue");
                AuthzError::Concurrency {
                    group_id,
                    expected_version,
                }
            })
        })
        .instrument(span)
        .await
    }

    async fn delete_group_at(&self, group_id: GroupId, expected_version: Version) -> Result<()> {
        let span = tracing::info_span!(
            parent: &self.span,
            "delete_group",
            group_id,
            expected_version
        );
        self.bounded(async {
            let result = sqlx::query("DELETE FROM groups WHERE id = $1 AND version = $2")
                .bind(group_id)
                .bind(expected_version)
                .execute(&self.pool)
                .await
                .map_err(database_error("failed to delete group"))?;

            if result.rows_affected() == 0 {
                tracing::error!("failed to delete group due to concurrency issue");
                return Err(AuthzError::Concurrency {
                    group_id,
                    expected_version,
                });
            }
            Ok(())
        })
        .instrument(span)
        .await
    }

    async fn update_user_groups(&self, user_id: &str, groups: &[GroupId]) -> Result<()> {
        let span = tracing::info_span!(parent: &self.span, "update_user_groups", user_id);
        self.bounded(async {
            sqlx::query(
                r#"
                WITH desired AS (
                    SELECT DISTINCT unnest($2::int[]) AS group_id
                ),
                removed AS (
                    DELETE FROM subjects s
                    WHERE s.id = $1::text
                      AND NOT EXISTS (
                          SELECT 1 FROM desired d WHERE d.group_id = s.group_id
                      )
                )
                INSERT INTO subjects (id, group_id)
                SELECT $1::text, d.group_id FROM desired d
                ON CONFLICT (id, group_id) DO NOTHING
                "#,
            )
            .bind(user_id)
            .bind(groups)
            .execute(&self.pool)
            .await
            .map_err(database_error("failed to merge user groups"))?;
            Ok(())
        })
        .instrument(span)
        .await
    }

    async fn delete_user(&self, user_id: &str) -> Result<u64> {
        let span = tracing::info_span!(parent: &self.span, "delete_user", user_id);
        self.bounded(async {
            let result = sqlx::query("DELETE FROM subjects WHERE id = $1")
                .bind(user_id)
                .execute(&self.pool)
                .await
                .map_err(database_error("failed to delete user"))?;

            match result.rows_affected() {
                0 => {
                    tracing::error!("no user records found for deletion");
                    Err(AuthzError::NoUserRecordsDeleted(user_id.to_string()))
                }
                n => Ok(n),
            }
        })
        .instrument(span)
        .await
    }

    async fn read_policy(&self) -> Result<Policy> {
        let span = tracing::info_span!(parent: &self.span, "read_policy");
        self.bounded(async {
            let mut conn = self
                .pool
                .acquire()
                .await
                .map_err(database_error("failed to acquire connection"))?;

            let mut builder = PolicySnapshotBuilder::new();
            let mut rows = sqlx::raw_sql(READ_POLICY_BATCH).fetch(&mut *conn);

            while let Some(next) = rows.next().await {
                let row = next.map_err(stream_error)?;
                fold_row(&mut builder, &row).map_err(stream_error)?;
            }

            Ok(builder.build())
        })
        .instrument(span)
        .await
    }
}

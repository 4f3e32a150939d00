//! sqlx error classification.
//!
//! Nothing outside this crate sees a `sqlx::Error`: each failure is logged
//! in the current operation span and re-emitted as an `AuthzError`.

use authz_core::{AuthzError, GroupId};

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}

/// Generic storage failure with a short description of the step that failed.
pub(crate) fn database_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AuthzError {
    move |err| {
        tracing::error!(error = %err, "{}", context);
        AuthzError::Database(anyhow::Error::new(err).context(context))
    }
}

/// Failure while iterating or decoding rows, as opposed to sending the query.
pub(crate) fn read_error(context: &'static str) -> impl FnOnce(sqlx::Error) -> AuthzError {
    move |err| {
        tracing::error!(error = %err, "{}", context);
        AuthzError::Read(anyhow::Error::new(err).context(context))
    }
}

pub(crate) fn version_lookup_error(group_id: GroupId) -> impl FnOnce(sqlx::Error) -> AuthzError {
    move |err| match err {
        sqlx::Error::RowNotFound => {
            tracing::error!("group not found");
            AuthzError::GroupNotFound(group_id)
        }
        other => database_error("failed to query group version")(other),
    }
}

/// Unique violations become `NameExists`; anything else is a storage failure.
pub(crate) fn name_write_error<'a>(
    name: &'a str,
    context: &'static str,
) -> impl FnOnce(sqlx::Error) -> AuthzError + 'a {
    move |err| {
        if is_unique_violation(&err) {
            tracing::error!(name, "name already exists");
            AuthzError::NameExists(name.to_string())
        } else {
            database_error(context)(err)
        }
    }
}

/// Failures on the policy row stream, classified by what failed rather than
/// by where in the stream it happened. Column and value decoding are internal
/// read failures; transport, server and pool failures are storage failures
/// even after rows have arrived.
pub(crate) fn stream_error(err: sqlx::Error) -> AuthzError {
    match err {
        sqlx::Error::Decode(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => read_error("failed to read policy rows")(err),
        other => database_error("failed to query policy")(other),
    }
}

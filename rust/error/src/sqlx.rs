use crate::{ErrorCodes, ProviderError};
use thiserror::Error;

/// Maps a PostgreSQL SQLSTATE to an error code.
/// See https://www.postgresql.org/docs/current/errcodes-appendix.html
pub fn sqlstate_code(sqlstate: &str) -> ErrorCodes {
    match sqlstate {
        // duplicate_object, duplicate_database, duplicate_schema
        "42710" | "42P04" | "42P06" => ErrorCodes::AlreadyExists,
        // undefined_object, invalid_catalog_name, invalid_schema_name
        "42704" | "3D000" | "3F000" => ErrorCodes::NotFound,
        // insufficient_privilege
        "42501" => ErrorCodes::PermissionDenied,
        // invalid_password, invalid_authorization_specification
        "28P01" | "28000" => ErrorCodes::Unauthenticated,
        // dependent_objects_still_exist, object_in_use
        "2BP01" | "55006" => ErrorCodes::FailedPrecondition,
        // serialization_failure, deadlock_detected, lock_not_available
        "40001" | "40P01" | "55P03" => ErrorCodes::Aborted,
        // query_canceled
        "57014" => ErrorCodes::DeadlineExceeded,
        s if s.starts_with("08") => ErrorCodes::Unavailable,
        s if s.starts_with("42") || s.starts_with("22") => ErrorCodes::InvalidArgument,
        _ => ErrorCodes::Internal,
    }
}

/// Implements `ProviderError` for `sqlx::Error`.
#[derive(Debug, Error)]
#[error("Database error: {0}")]
pub struct WrappedSqlxError(#[from] pub sqlx::Error);

impl WrappedSqlxError {
    pub fn sqlstate(&self) -> Option<String> {
        match &self.0 {
            sqlx::Error::Database(db_err) => db_err.code().map(|code| code.into_owned()),
            _ => None,
        }
    }
}

impl ProviderError for WrappedSqlxError {
    fn code(&self) -> ErrorCodes {
        match &self.0 {
            sqlx::Error::Database(db_err) => db_err
                .code()
                .map(|code| sqlstate_code(&code))
                .unwrap_or(ErrorCodes::Internal),
            sqlx::Error::RowNotFound => ErrorCodes::NotFound,
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed => {
                ErrorCodes::Unavailable
            }
            sqlx::Error::PoolTimedOut => ErrorCodes::DeadlineExceeded,
            sqlx::Error::Configuration(_) => ErrorCodes::InvalidArgument,
            _ => ErrorCodes::Internal,
        }
    }
}

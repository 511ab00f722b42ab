//! Conversions from external infrastructure errors into domain errors.

use kindred_domain::KindredError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub KindredError);

impl From<InfraError> for KindredError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<KindredError> for InfraError {
    fn from(value: KindredError) -> Self {
        InfraError(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoKindredError {
    fn into_kindred(self) -> KindredError;
}

/// SQLITE_CONSTRAINT_UNIQUE and SQLITE_CONSTRAINT_PRIMARYKEY.
const UNIQUE_EXTENDED_CODES: [i32; 2] = [2067, 1555];

/// True if `err` is a UNIQUE or PRIMARY KEY constraint violation.
pub fn is_unique_violation(err: &SqlError) -> bool {
    matches!(
        err,
        SqlError::SqliteFailure(ffi, _) if UNIQUE_EXTENDED_CODES.contains(&ffi.extended_code)
    )
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → KindredError */
/* -------------------------------------------------------------------------- */

impl IntoKindredError for SqlError {
    fn into_kindred(self) -> KindredError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        fn looks_like_wrong_key(message: &str) -> bool {
            let lower = message.to_ascii_lowercase();
            lower.contains("not a database") || lower.contains("encrypted")
        }

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        KindredError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        KindredError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, code)
                        if UNIQUE_EXTENDED_CODES.contains(&code) =>
                    {
                        KindredError::Database(format!("unique constraint violation: {message}"))
                    }
                    (ErrorCode::ConstraintViolation, 787) => {
                        KindredError::Database("foreign key constraint violation".into())
                    }
                    (_, _) if looks_like_wrong_key(&message) => KindredError::Config(
                        "SQLCipher key rejected or database not encrypted".into(),
                    ),
                    _ => KindredError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => KindredError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                KindredError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                KindredError::Database(format!("invalid column type: {ty}"))
            }
            RE::InvalidPath(path) => KindredError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            other => KindredError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        InfraError(value.into_kindred())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → KindredError */
/* -------------------------------------------------------------------------- */

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        InfraError(KindredError::Database(format!("connection pool error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → KindredError */
/* -------------------------------------------------------------------------- */

impl IntoKindredError for HttpError {
    fn into_kindred(self) -> KindredError {
        if self.is_timeout() {
            return KindredError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return KindredError::Network("HTTP connection failure".into());
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => KindredError::Auth(message),
                404 => KindredError::NotFound(message),
                400..=499 => KindredError::InvalidInput(message),
                _ => KindredError::Network(message),
            };
        }

        if self.is_decode() {
            return KindredError::Network(format!("invalid response body: {self}"));
        }

        KindredError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        InfraError(value.into_kindred())
    }
}

/* -------------------------------------------------------------------------- */
/* serde_json / io → KindredError */
/* -------------------------------------------------------------------------- */

impl From<serde_json::Error> for InfraError {
    fn from(value: serde_json::Error) -> Self {
        InfraError(KindredError::Internal(format!("JSON error: {value}")))
    }
}

impl From<std::io::Error> for InfraError {
    fn from(value: std::io::Error) -> Self {
        InfraError(KindredError::Internal(format!("I/O error: {value}")))
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */

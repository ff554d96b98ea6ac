// sqlx::Error -> StoreError
//
// Orphan rules keep `From<sqlx::Error>` out of core, so adapters map here.
// Lock contention and pool exhaustion are transient; everything else is not.

use cadence_core::port::StoreError;

// SQLite result codes: https://www.sqlite.org/rescode.html
const SQLITE_BUSY: &str = "5";
const SQLITE_LOCKED: &str = "6";
const SQLITE_BUSY_SNAPSHOT: &str = "517";

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db_err) => match db_err.code().as_deref() {
            Some(SQLITE_BUSY) | Some(SQLITE_LOCKED) | Some(SQLITE_BUSY_SNAPSHOT) => {
                StoreError::Transient(format!("Database locked: {}", db_err.message()))
            }
            Some(code) => StoreError::Backend(format!("Database error [{}]: {}", code, db_err.message())),
            None => StoreError::Backend(format!("Database error: {}", db_err.message())),
        },
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) | sqlx::Error::WorkerCrashed => {
            StoreError::Transient(err.to_string())
        }
        _ => StoreError::Backend(err.to_string()),
    }
}

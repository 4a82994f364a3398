// sqlx::Error -> AppError
//
// Orphan rules forbid `impl From<sqlx::Error> for AppError` here, so adapters
// map through this helper.

use txbridge_core::error::AppError;

pub(crate) fn map_sqlx_error(err: sqlx::Error) -> AppError {
    match &err {
        sqlx::Error::Database(db_err) => {
            // SQLite result codes: https://www.sqlite.org/rescode.html
            match db_err.code().as_deref() {
                Some(code @ ("2067" | "1555")) => AppError::Database(format!(
                    "Unique constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                Some(code @ ("787" | "3850")) => AppError::Database(format!(
                    "Foreign key constraint violation: {} ({})",
                    db_err.message(),
                    code
                )),
                Some("5") => AppError::Database(format!(
                    "Database locked (SQLITE_BUSY): {}",
                    db_err.message()
                )),
                Some("8") => AppError::Database(format!(
                    "Attempt to write a readonly database: {}",
                    db_err.message()
                )),
                Some(code) => AppError::Database(format!(
                    "Database error [{}]: {}",
                    code,
                    db_err.message()
                )),
                None => AppError::Database(format!("Database error: {}", db_err.message())),
            }
        }
        sqlx::Error::RowNotFound => AppError::NotFound("row".to_string()),
        sqlx::Error::ColumnNotFound(col) => AppError::Database(format!("Column not found: {col}")),
        sqlx::Error::PoolTimedOut => {
            AppError::Database("Timed out waiting for a pooled connection".to_string())
        }
        _ => AppError::Database(err.to_string()),
    }
}

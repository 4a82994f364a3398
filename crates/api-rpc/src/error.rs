//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use txbridge_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const CONFLICT: i32 = 4002;
    pub const UNSUPPORTED: i32 = 4004;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const DB_ERROR: i32 = 5001;
    pub const TRANSACTION_ERROR: i32 = 5003;
}

fn owned(code: i32, msg: impl Into<String>) -> ErrorObjectOwned {
    ErrorObjectOwned::owned(code, msg.into(), None::<()>)
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let message = err.to_string();
    match err {
        AppError::Validation(_) | AppError::Domain(_) | AppError::Serialization(_) => {
            owned(code::VALIDATION_ERROR, message)
        }
        AppError::NotFound(_) => owned(code::NOT_FOUND, message),
        AppError::UnsupportedOperation(_) => owned(code::UNSUPPORTED, message),
        AppError::IllegalTransactionState(_) | AppError::UnexpectedRollback => {
            owned(code::CONFLICT, message)
        }
        AppError::TransactionCreation(_)
        | AppError::TransactionCommit(_)
        | AppError::TransactionRollback(_)
        | AppError::TransactionTimedOut(_) => owned(code::TRANSACTION_ERROR, message),
        AppError::Database(_) => owned(code::DB_ERROR, message),
        AppError::Io(_) | AppError::Config(_) | AppError::Internal(_) => {
            owned(code::INTERNAL_ERROR, message)
        }
    }
}

//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use cadence_core::error::AppError;
use jsonrpsee::types::ErrorObjectOwned;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const NOT_FOUND: i32 = 4001;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const STORE_ERROR: i32 = 5001;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let code = match &err {
        AppError::Validation(_) | AppError::Domain(_) | AppError::Serialization(_) => {
            code::VALIDATION_ERROR
        }
        AppError::NotFound(_) => code::NOT_FOUND,
        AppError::Store(_) => code::STORE_ERROR,
        AppError::Config(_)
        | AppError::Compute(_)
        | AppError::Execution(_)
        | AppError::Io(_)
        | AppError::Internal(_) => code::INTERNAL_ERROR,
    };
    ErrorObjectOwned::owned(code, err.to_string(), None::<()>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::port::StoreError;

    #[test]
    fn test_not_found_code() {
        let err = to_rpc_error(AppError::NotFound("task x".to_string()));
        assert_eq!(err.code(), code::NOT_FOUND);
        assert!(err.message().contains("task x"));
    }

    #[test]
    fn test_store_code() {
        let err = to_rpc_error(AppError::Store(StoreError::Transient("busy".to_string())));
        assert_eq!(err.code(), code::STORE_ERROR);
    }
}

//! Convenience result type alias for crudkit.

use crate::error::AppError;

/// A specialized `Result` type for crudkit operations.
pub type AppResult<T> = Result<T, AppError>;

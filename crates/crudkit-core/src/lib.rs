//! # crudkit-core
//!
//! Core crate for crudkit. Contains configuration schemas, the condition,
//! sorting and pagination value types shared by every backend, and the
//! unified error system.
//!
//! This crate has **no** internal dependencies on other crudkit crates.

pub mod config;
pub mod error;
pub mod result;
pub mod types;

pub use error::AppError;
pub use result::AppResult;

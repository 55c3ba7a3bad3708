//! `permctl` Core Library
//!
//! Shared functionality for `permctl` components:
//! - Permission kinds, statuses and probe results
//! - Configuration resolution and hierarchy
//! - Common error types
//! - Tracing initialisation

pub mod config;
pub mod error;
pub mod permission;
pub mod tracing_init;

pub use config::Config;
pub use error::{Error, Result};
pub use permission::{PermissionKind, PermissionResult, PermissionStatus, ResultSource};

//! permctl CLI Library
//!
//! Diagnostic subcommands for the permission agent.

pub mod markers_cmd;
pub mod status_cmd;

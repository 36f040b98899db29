//! crds-submit CLI — login, lock checks and uploads from the command line.

pub mod commands;
pub mod config;

pub use config::{resolve_session_config, ConnectionArgs};

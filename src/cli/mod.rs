//! CLI commands
//!
//! Command implementations for the `depflow` binary.

mod auth;
mod orchestrate;
mod style;
mod validate;

pub use auth::{run_auth_setup, run_auth_test};
pub use orchestrate::{run_code_flow_status, run_loop, run_status, run_trigger};
pub use validate::run_validate;

//! Shared test utilities

#![allow(dead_code, unused_imports)]

pub mod fixtures;
pub mod mock_provider;

pub use fixtures::*;
pub use mock_provider::MockGitProvider;

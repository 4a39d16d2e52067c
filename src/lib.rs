//! depflow - dependency flow orchestration
//!
//! Keeps one update pull request per subscription target, resolves
//! dependency and coherency updates for new builds, renders the PR
//! description incrementally and drives the PR to merge once its merge
//! policies pass.
//!
//! The pieces, leaves first:
//!
//! - [`resolver`]: which manifest entries a build changes
//! - [`description`]: PR body rendering
//! - [`validation`]: subscription conflict rules
//! - [`orchestrator`]: the per-target state machine

pub mod auth;
pub mod config;
pub mod description;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod platform;
pub mod resolver;
pub mod types;
pub mod validation;

pub use error::{Error, Result};

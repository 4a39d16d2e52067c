//! PR description building
//!
//! A description is parsed into [`Description`] (free text plus marked
//! per-subscription blocks), edited block by block through
//! [`DescriptionBuilder`], and rendered back to markdown.

mod builder;
mod links;
mod model;
mod title;

pub use builder::{
    COHERENCY_ERRORS_KEY, COHERENCY_UPDATES_KEY, CodeFlowBlock, DEFAULT_HEADER,
    DescriptionBuilder,
};
pub use links::{GITHUB_COMPARISON_SHA_LENGTH, changes_uri, short_repo_name};
pub use model::{Description, Segment, begin_marker, end_marker, footnote_index};
pub use title::{
    FAILED_COHERENCY_COMMIT_MESSAGE, TITLE_LENGTH_LIMIT, build_commit_message,
    code_flow_title, coherency_commit_message, pull_request_title,
};

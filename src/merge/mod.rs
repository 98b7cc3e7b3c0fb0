//! Merge operations for configuration documents
//!
//! Environment definitions are split into a base document and per-environment
//! overlays. This module merges them into one effective document before it is
//! turned into typed records by [`crate::config`].

pub mod json;

pub use json::{merge_all, merge_json_values};

/// How arrays in an overlay combine with arrays in the base document.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ListMerge {
    /// The overlay array replaces the base array.
    #[default]
    Replace,
    /// The overlay array is appended to the base array.
    Append,
}

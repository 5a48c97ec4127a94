//! csvmerge3 library crate — re-exports for the CLI and integration tests.
//!
//! The primary interface is the `csvmerge3` binary; [`merge::merge3`] is
//! the embeddable entry point.

pub mod config;
pub mod csv;
pub mod cursor;
pub mod error;
pub mod headers;
pub mod key;
pub mod merge;
pub mod table;

pub use error::MergeError;
pub use merge::{MergeInput, MergeOptions, MergeSummary, merge3};

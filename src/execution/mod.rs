//! Execution Module
//!
//! Applies cluster assignments to the filesystem: one folder per cluster
//! under the managed root, files moved into place.

pub mod sanitize;
pub mod synchronizer;

pub use sanitize::*;
pub use synchronizer::*;

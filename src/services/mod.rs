//! External collaborators of the engine: change notifications and file content.

pub mod extractor;
pub mod watcher;

pub use extractor::*;
pub use watcher::*;

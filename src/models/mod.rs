pub mod event;
pub mod file;

pub use event::*;
pub use file::*;

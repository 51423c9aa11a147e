//! Folder naming for clusters

pub mod client;
pub mod naming;
pub mod prompts;

pub use client::*;
pub use naming::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum NamingError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Failed to parse response: {0}")]
    Parse(String),

    #[error("Naming failed: {0}")]
    Other(String),
}

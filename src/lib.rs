//! Semantic Entropy File System
//!
//! Keeps a directory organized into semantically named folders: files are
//! embedded, clustered by content similarity and moved into one folder per
//! cluster, while every file keeps a stable identity across moves.

pub mod ai;
pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod execution;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;
pub mod vector;

pub use config::EngineConfig;
pub use coordinator::{EngineError, Phase, ReorganizationCoordinator};

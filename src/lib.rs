//! Audio duplicate finder - shared modules for the CLI and tests.

pub mod assemble;
pub mod audio;
pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod extract;
pub mod features;
pub mod hierarchy;
pub mod models;
pub mod partition;
pub mod progress;
pub mod scan;
pub mod similarity;

pub use config::{EngineConfig, FeatureConfig};
pub use engine::{cluster_tracks, DuplicateFinder};
pub use error::{EngineError, ExtractError};
pub use models::{DedupReport, DuplicateCluster, FailureRecord};

//! Scanflow - staged security reconnaissance pipeline
//!
//! Scanflow runs a fixed graph of scanning stages against a target, from
//! subdomain discovery through HTTP probing and crawling to vulnerability
//! and injection testing. Each stage wraps one or more external tools.
//!
//! ## Runs
//!
//! Every run is persisted as it progresses: run metadata, one step row per
//! stage, findings, and the output artifacts under the run directory. A run
//! that was interrupted can be resumed; completed stages are not executed
//! again and their outputs feed the remaining ones.
//!
//! ## Engagement modes
//!
//! The engagement mode picks the global rate limit, the per-host rate limit
//! passed on to tools, and the worker count of the task scheduler.

pub mod audit;
pub mod classifier;
pub mod config;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod scheduler;
pub mod state;
pub mod storage;
pub mod tools;

pub use domain::*;
pub use error::{Error, Result};
pub use orchestrator::PipelineOrchestrator;

//! Core domain types for the scanning pipeline

mod finding;
mod run;
mod stage;
mod step;
mod tool;

pub use finding::{Confidence, Finding, Severity};
pub use run::{EngagementMode, ModeLimits, RunMetadata, RunState, new_run_id};
pub use stage::{ClassificationGroup, PipelineStage, StageResult};
pub use step::{PipelineStep, StepStatus};
pub use tool::{OutputFormat, ToolConfig, ToolResult};

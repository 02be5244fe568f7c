//! Stage input resolution from stored stage outputs

use crate::classifier::ClassificationResult;
use crate::domain::{ClassificationGroup, PipelineStage};
use crate::state::RunStateManager;

/// Inputs for `stage`, read from the stored output of its dependencies.
///
/// The first stage consumes the run target. Testing stages read the
/// classification records and take their URLs, filtered by candidate group
/// for the stages that have one.
pub fn stage_inputs(stage: PipelineStage, state: &RunStateManager, target: &str) -> Vec<String> {
    if stage.dependencies().is_empty() {
        return vec![target.to_string()];
    }
    if stage.is_testing() {
        let records = state.get_stage_output(PipelineStage::UrlClassification);
        return classified_urls(records, stage.input_group());
    }

    stage
        .dependencies()
        .iter()
        .flat_map(|dep| state.get_stage_output(*dep).iter().cloned())
        .collect()
}

/// URLs from classification JSONL records, optionally only those tagged `group`
pub fn classified_urls(records: &[String], group: Option<ClassificationGroup>) -> Vec<String> {
    records
        .iter()
        .filter_map(|line| match serde_json::from_str::<ClassificationResult>(line) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!("Skipping malformed classification record: {}", e);
                None
            }
        })
        .filter(|record| group.is_none_or(|g| record.has_group(g)))
        .map(|record| record.url)
        .filter(|url| !url.is_empty())
        .collect()
}

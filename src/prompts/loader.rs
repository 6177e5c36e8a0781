use tracing::{debug, warn};

use super::metadata::{read_metadata, MetadataRecord};
use super::scanner::ItemDirectory;
use crate::errors::{SkipReason, Skipped};

#[derive(Debug, Default)]
pub struct LoadReport {
    pub records: Vec<MetadataRecord>,
    pub skipped: Vec<Skipped>,
}

/// Parse every item's metadata for the push phase.
///
/// Unreadable or unparsable files and records still lacking a `prompt_id`
/// are dropped from the batch and reported in `skipped`; they never fail the run.
pub fn load_records(dirs: &[ItemDirectory]) -> LoadReport {
    let mut report = LoadReport::default();
    for dir in dirs.iter().filter(|d| d.has_metadata) {
        let path = dir.metadata_path();
        let loaded = read_metadata(&path).and_then(|record| {
            if record.prompt_id().is_some() {
                Ok(record)
            } else {
                Err(SkipReason::MissingPromptId { path })
            }
        });
        match loaded {
            Ok(record) => {
                debug!(
                    dir = %dir.name,
                    prompt_id = record.prompt_id(),
                    task = record.task(),
                    language = record.language(),
                    models = ?record.models(),
                    "loaded record"
                );
                report.records.push(record);
            }
            Err(reason) => {
                warn!(dir = %dir.name, kind = reason.kind(), error = %reason, "dropping record from batch");
                report.skipped.push(Skipped {
                    dir: dir.name.clone(),
                    reason,
                });
            }
        }
    }
    report
}

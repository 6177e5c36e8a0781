use tracing::{info, warn};
use uuid::Uuid;

use super::metadata::{read_metadata, write_metadata};
use super::scanner::ItemDirectory;
use crate::errors::{SkipReason, Skipped};

#[derive(Debug, Default)]
pub struct AssignReport {
    /// (directory name, new prompt_id)
    pub assigned: Vec<(String, String)>,
    pub unchanged: usize,
    pub skipped: Vec<Skipped>,
}

/// Give every metadata file without a `prompt_id` a fresh v4 UUID and write it back.
///
/// Files that already carry an id are not touched. Runs sequentially and must
/// finish before any record is loaded for the database, since upserts key on
/// the id written here.
pub fn assign_missing_ids(dirs: &[ItemDirectory]) -> AssignReport {
    let mut report = AssignReport::default();
    for dir in dirs.iter().filter(|d| d.has_metadata) {
        match assign_one(dir) {
            Ok(Some(id)) => {
                info!(dir = %dir.name, prompt_id = %id, "assigned prompt_id");
                report.assigned.push((dir.name.clone(), id));
            }
            Ok(None) => report.unchanged += 1,
            Err(reason) => {
                warn!(dir = %dir.name, kind = reason.kind(), error = %reason, "skipping id assignment");
                report.skipped.push(Skipped {
                    dir: dir.name.clone(),
                    reason,
                });
            }
        }
    }
    report
}

fn assign_one(dir: &ItemDirectory) -> Result<Option<String>, SkipReason> {
    let path = dir.metadata_path();
    let mut record = read_metadata(&path)?;
    if record.prompt_id().is_some() {
        return Ok(None);
    }
    let id = Uuid::new_v4().to_string();
    record.set_prompt_id(id.clone());
    write_metadata(&path, &record)?;
    Ok(Some(id))
}

use std::path::PathBuf;

use thiserror::Error;

/// Why a single item directory was left out of a phase.
///
/// Skips never abort a run; they are logged and returned in the phase report
/// so callers (and tests) can see exactly what was dropped.
#[derive(Debug, Error)]
pub enum SkipReason {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{} does not contain a metadata record", path.display())]
    EmptyContainer { path: PathBuf },
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{} has no prompt_id; not pushed", path.display())]
    MissingPromptId { path: PathBuf },
}

impl SkipReason {
    #[cfg(test)]
    pub(crate) fn path(&self) -> &std::path::Path {
        match self {
            SkipReason::Read { path, .. }
            | SkipReason::Parse { path, .. }
            | SkipReason::EmptyContainer { path }
            | SkipReason::Write { path, .. }
            | SkipReason::MissingPromptId { path } => path,
        }
    }

    /// Short tag used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::Read { .. } => "read",
            SkipReason::Parse { .. } => "parse",
            SkipReason::EmptyContainer { .. } => "empty",
            SkipReason::Write { .. } => "write",
            SkipReason::MissingPromptId { .. } => "missing_prompt_id",
        }
    }
}

/// An item that was skipped, keyed by its directory name.
#[derive(Debug)]
pub struct Skipped {
    pub dir: String,
    pub reason: SkipReason,
}

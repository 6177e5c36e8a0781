use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::metadata::METADATA_FILE_NAME;

/// One candidate item directory under the prompts root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemDirectory {
    pub name: String,
    pub path: PathBuf,
    pub has_metadata: bool,
}

impl ItemDirectory {
    pub fn metadata_path(&self) -> PathBuf {
        self.path.join(METADATA_FILE_NAME)
    }
}

/// List the immediate subdirectories of `root`.
///
/// Results are sorted by name so log output is stable between runs; nothing
/// downstream depends on the order.
pub fn scan_item_dirs(root: &Path) -> Result<Vec<ItemDirectory>> {
    let entries = std::fs::read_dir(root)
        .with_context(|| format!("failed to read prompts root {}", root.display()))?;
    let mut dirs = Vec::new();
    for entry in entries {
        let entry =
            entry.with_context(|| format!("failed to list prompts root {}", root.display()))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        let has_metadata = path.join(METADATA_FILE_NAME).is_file();
        debug!(dir = %name, has_metadata, "discovered item directory");
        dirs.push(ItemDirectory {
            name,
            path,
            has_metadata,
        });
    }
    dirs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(dirs)
}

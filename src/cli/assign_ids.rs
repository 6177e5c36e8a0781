use anyhow::Result;
use std::path::PathBuf;

use crate::pipeline::assign_ids_only;
use crate::prompts::AssignReport;
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct AssignIdsConfig {
    /// Optional override for the item root (defaults to env PROMPTS_ROOT).
    pub prompts_root: Option<PathBuf>,
}

pub fn run(cfg: AssignIdsConfig) -> Result<AssignReport> {
    env_util::init_env();
    let root = cfg.prompts_root.unwrap_or_else(env_util::prompts_root);
    let report = assign_ids_only(&root)?;

    let mut out = String::new();
    out.push_str(&format!("root: {}\n", root.display()));
    for (dir, id) in &report.assigned {
        out.push_str(&format!("  assigned {dir:<32} {id}\n"));
    }
    for skipped in &report.skipped {
        out.push_str(&format!("  skipped  {:<32} {}\n", skipped.dir, skipped.reason));
    }
    out.push_str(&format!(
        "assigned={} unchanged={} skipped={}",
        report.assigned.len(),
        report.unchanged,
        report.skipped.len()
    ));
    println!("{}", out);
    Ok(report)
}

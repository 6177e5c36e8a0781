use anyhow::Result;
use std::path::PathBuf;
use tracing::info;

use crate::pipeline::{run_sync, SyncConfig, SyncSummary};
use crate::util::env as env_util;

#[derive(Debug, Clone, Default)]
pub struct PushConfig {
    /// Optional override for the item root (defaults to env PROMPTS_ROOT).
    pub prompts_root: Option<PathBuf>,
    /// Optional override for the connection string (defaults to env DATABASE_URL).
    pub database_url: Option<String>,
}

pub async fn run(cfg: PushConfig) -> Result<SyncSummary> {
    env_util::init_env();
    env_util::preflight_check(
        "prompt_db_pusher",
        &[],
        &["DATABASE_URL", "MONGODB_URI", "PROMPTS_ROOT", "DB_MAX_CONNS"],
    )?;

    let mut sync = match cfg.database_url {
        Some(database_url) => SyncConfig {
            prompts_root: env_util::prompts_root(),
            database_url,
            max_connections: env_util::env_parse("DB_MAX_CONNS", 5u32).max(1),
        },
        None => SyncConfig::from_env()?,
    };
    if let Some(root) = cfg.prompts_root {
        sync.prompts_root = root;
    }

    let summary = run_sync(&sync).await?;
    info!(
        upserted = summary.upserted,
        skipped = summary.load_skipped,
        "push finished"
    );
    Ok(summary)
}

use anyhow::Result;
use prompt_db_pusher::cli::push::{run, PushConfig};
use prompt_db_pusher::logging::{init_tracing, DEFAULT_LOG_FILTER};

#[tokio::main]
async fn main() -> Result<()> {
    // --- logging -------------------------------------------------------------
    prompt_db_pusher::util::env::init_env();
    init_tracing(DEFAULT_LOG_FILTER)?;

    run(PushConfig::default()).await?;
    Ok(())
}

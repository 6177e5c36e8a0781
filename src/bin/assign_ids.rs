use anyhow::Result;
use prompt_db_pusher::cli::assign_ids::{run, AssignIdsConfig};
use prompt_db_pusher::logging::{init_tracing, DEFAULT_LOG_FILTER};

fn main() -> Result<()> {
    prompt_db_pusher::util::env::init_env();
    init_tracing(DEFAULT_LOG_FILTER)?;

    run(AssignIdsConfig::default())?;
    Ok(())
}

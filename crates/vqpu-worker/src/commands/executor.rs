//! Executor command implementation.

use anyhow::Result;
use console::style;

use vqpu_comm::FileDiscovery;
use vqpu_worker::{GroupExecutor, WorkerConfig, build_engine};

use super::common::bind_router;

/// Host a quantum-communication group until the channel fails.
pub async fn execute(job_id: &str, group_size: usize, config: &WorkerConfig) -> Result<()> {
    if group_size == 0 {
        anyhow::bail!("group size must be at least 1");
    }
    let channel = bind_router(config).await?;
    let store = FileDiscovery::new(config.discovery_path());
    eprintln!(
        "{} Executor for {} at {} ({} members)",
        style("→").cyan().bold(),
        style(job_id).green(),
        style(channel.endpoint()).yellow(),
        group_size
    );

    let mut executor = GroupExecutor::new(job_id, group_size, channel, build_engine(config)?);
    executor.assemble(&store, config.wait_policy()).await?;
    executor.serve().await?;
    Ok(())
}

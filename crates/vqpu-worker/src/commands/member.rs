//! Member command implementation.

use anyhow::Result;

use vqpu_comm::FileDiscovery;
use vqpu_worker::{GroupMember, WorkerConfig};

use super::common::{bind_router, emit, read_task_text, report};

/// Submit one task to its group's executor and wait for the result.
pub async fn execute(
    task_path: &str,
    job_id: &str,
    local_id: &str,
    output: Option<&str>,
    config: &WorkerConfig,
) -> Result<()> {
    let source = read_task_text(task_path)?;
    let channel = bind_router(config).await?;
    let store = FileDiscovery::new(config.discovery_path());

    let mut member = GroupMember::new(job_id, local_id, channel);
    member.join(&store, config.wait_policy()).await?;
    let doc = member.submit(&source).await?;
    let failed = report(&doc);
    emit(&doc, output)?;
    if failed {
        anyhow::bail!("group execution failed");
    }
    Ok(())
}

//! QPU command implementation.

use std::sync::Arc;

use anyhow::Result;
use tracing::info;

use vqpu_comm::{DiscoveryStore, FileDiscovery};
use vqpu_worker::{PeerDirectory, QpuWorker, WorkerConfig, build_engine};

use super::common::{bind_router, emit, load_task, read_task_text, report};

/// One classical-communication worker process.
pub async fn execute(
    task_path: &str,
    job_id: &str,
    output: Option<&str>,
    config: &WorkerConfig,
) -> Result<()> {
    let source = read_task_text(task_path)?;
    let task_id = load_task(task_path)?.id;

    let channel = bind_router(config).await?;
    let store: Arc<dyn DiscoveryStore> = Arc::new(FileDiscovery::new(config.discovery_path()));
    let key = format!("{job_id}_{task_id}");
    channel.publish(store.as_ref(), &key).await?;
    info!(%key, endpoint = %channel.endpoint(), "Worker published");

    let directory = PeerDirectory::new(store, job_id, config.wait_policy());
    let mut worker = QpuWorker::new(build_engine(config)?)
        .with_channel(channel)
        .with_directory(directory);

    let doc = worker.handle_message(&source).await;
    let failed = report(&doc);
    emit(&doc, output)?;
    if failed {
        anyhow::bail!("task {task_id} failed");
    }
    Ok(())
}

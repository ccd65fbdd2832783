//! Run command implementation.

use anyhow::Result;
use console::style;

use vqpu_exec::ShotAggregator;
use vqpu_worker::{WorkerConfig, build_engine};

use super::common::{emit, load_task, report};

/// Co-execute every task in one combined register.
pub async fn execute(tasks: &[String], output: Option<&str>, config: &WorkerConfig) -> Result<()> {
    let mut aggregator = ShotAggregator::new(build_engine(config)?);
    for path in tasks {
        let task = load_task(path)?;
        eprintln!(
            "  Loaded {}: {} qubits, {} instructions",
            style(&task.id).green(),
            task.num_qubits(),
            task.instructions.len()
        );
        aggregator.add_task(task);
    }
    eprintln!(
        "{} Running {} task(s) on {}",
        style("→").cyan().bold(),
        aggregator.tasks().len(),
        style(aggregator.engine_name()).yellow()
    );

    let doc = aggregator.run_document().await;
    let failed = report(&doc);
    emit(&doc, output)?;
    if failed {
        anyhow::bail!("group execution failed");
    }
    Ok(())
}

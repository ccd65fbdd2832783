//! Ranks command implementation.

use anyhow::Result;
use console::style;
use serde_json::{Map, Value};

use vqpu_worker::{WorkerConfig, run_rank_group};

use super::common::{emit, load_task, report};

/// Run a classical-communication group in-process, one rank per task.
pub async fn execute(tasks: &[String], output: Option<&str>, config: &WorkerConfig) -> Result<()> {
    let tasks = tasks
        .iter()
        .map(|path| load_task(path))
        .collect::<Result<Vec<_>>>()?;
    let ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
    eprintln!(
        "{} Running {} ranks",
        style("→").cyan().bold(),
        tasks.len()
    );

    let docs = run_rank_group(tasks, config).await?;
    let mut failed = false;
    let mut results = Map::new();
    for (id, doc) in ids.into_iter().zip(docs) {
        eprint!("  {}: ", style(&id).green());
        failed |= report(&doc);
        results.insert(id, doc);
    }
    emit(&Value::Object(results), output)?;
    if failed {
        anyhow::bail!("at least one rank failed");
    }
    Ok(())
}

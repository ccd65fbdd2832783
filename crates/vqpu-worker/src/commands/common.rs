//! Shared helpers for CLI commands.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use console::style;
use serde_json::Value;

use vqpu_comm::{ClassicalChannel, RouterChannel};
use vqpu_ir::QuantumTask;
use vqpu_worker::{TransportKind, WorkerConfig};

/// Read a task document without decoding it.
pub fn read_task_text(path: &str) -> Result<String> {
    if !Path::new(path).exists() {
        anyhow::bail!("File not found: {path}");
    }
    fs::read_to_string(path).with_context(|| format!("Failed to read file: {path}"))
}

/// Load and decode a task document.
pub fn load_task(path: &str) -> Result<QuantumTask> {
    let source = read_task_text(path)?;
    QuantumTask::from_json(&source).map_err(|e| anyhow::anyhow!("{path}: {e}"))
}

/// Write a result document to `output`, or to stdout.
pub fn emit(doc: &Value, output: Option<&str>) -> Result<()> {
    let text = serde_json::to_string_pretty(doc)?;
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Failed to write file: {path}"))?;
            eprintln!("{} Result written to {}", style("✓").green().bold(), style(path).green());
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// Bind the socket channel for a worker process.
pub async fn bind_router(config: &WorkerConfig) -> Result<Arc<dyn ClassicalChannel>> {
    if config.transport.kind != TransportKind::Router {
        anyhow::bail!("Separate worker processes need the router transport; use `vqpu ranks` for rank groups");
    }
    let channel = RouterChannel::bind(config.router_options()).await?;
    Ok(Arc::new(channel))
}

/// Report the outcome of a run on stderr; true if the document is an error.
pub fn report(doc: &Value) -> bool {
    if let Some(message) = doc.get("ERROR").and_then(Value::as_str) {
        eprintln!("{} {}", style("Execution failed:").red().bold(), message);
        return true;
    }
    if let Some(time) = doc.get("time_taken").and_then(Value::as_f64) {
        eprintln!("{} Completed in {:.3}s", style("✓").green().bold(), time);
    }
    false
}

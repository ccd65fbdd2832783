//! Shot aggregation and result documents.

use std::sync::Arc;
use std::time::Instant;

use serde_json::{Value, json};
use tracing::{debug, info, instrument};
use vqpu_comm::{ClassicalChannel, Endpoint};
use vqpu_hal::{Counts, ExecutionResult, SimulationEngine};
use vqpu_ir::QuantumTask;

use crate::error::{ExecError, ExecResult};
use crate::scheduler::run_shot;
use crate::state::GroupLayout;

/// Runs every shot of a co-execution group and builds the histogram.
///
/// The task list is extended between runs and cleared once a batch is done.
/// Shot count and seed come from the first task.
pub struct ShotAggregator {
    engine: Box<dyn SimulationEngine>,
    channel: Option<Arc<dyn ClassicalChannel>>,
    tasks: Vec<QuantumTask>,
}

impl ShotAggregator {
    /// Create an aggregator driving `engine`.
    pub fn new(engine: Box<dyn SimulationEngine>) -> Self {
        Self {
            engine,
            channel: None,
            tasks: Vec::new(),
        }
    }

    /// Attach the process's classical channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn ClassicalChannel>) -> Self {
        self.channel = Some(channel);
        self
    }

    /// Add a task to the next run.
    pub fn add_task(&mut self, task: QuantumTask) {
        self.tasks.push(task);
    }

    /// Tasks queued for the next run.
    pub fn tasks(&self) -> &[QuantumTask] {
        &self.tasks
    }

    /// Drop every queued task.
    pub fn clear(&mut self) {
        self.tasks.clear();
    }

    /// Name of the engine in use.
    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    /// Run all shots of the queued tasks.
    #[instrument(skip(self), fields(tasks = self.tasks.len()))]
    pub async fn run(&mut self) -> ExecResult<ExecutionResult> {
        let layout = GroupLayout::new(&self.tasks)?;
        let channel = self.channel.as_deref();

        if channel.is_none() {
            let opcode = self
                .tasks
                .iter()
                .flat_map(|t| &t.instructions)
                .find(|inst| inst.op.is_cross_process());
            if let Some(inst) = opcode {
                return Err(ExecError::MissingChannel(inst.name.clone()));
            }
        }

        if let (Some(channel), [task]) = (channel, self.tasks.as_slice()) {
            let peers: Vec<Endpoint> = task.sending_to.iter().map(Endpoint::new).collect();
            channel.connect_all(&peers).await?;
            debug!(peers = peers.len(), "Connected to sending_to peers");
        }

        let first = &self.tasks[0];
        let shots = first.config.shots;
        if let Some(seed) = first.config.seed {
            self.engine.set_seed(seed);
        }

        info!(
            shots,
            qubits = layout.num_qubits(),
            clbits = layout.num_clbits(),
            engine = self.engine.name(),
            "Running co-execution group"
        );
        let start = Instant::now();
        let mut counts = Counts::new();
        for shot in 0..shots {
            self.engine.initialize(layout.num_qubits())?;
            let bits = run_shot(&self.tasks, &layout, self.engine.as_mut(), channel).await?;
            counts.increment(bits);
            if shot > 0 && shot % 1000 == 0 {
                debug!("Completed {} shots", shot);
            }
        }
        let elapsed = start.elapsed();
        debug!("Group completed in {:?}", elapsed);

        Ok(ExecutionResult::new(counts, elapsed.as_secs_f64()))
    }

    /// Run and encode the outcome as a result document.
    pub async fn run_document(&mut self) -> Value {
        result_document(&self.run().await)
    }
}

/// `{"counts": ..., "time_taken": ...}` on success, `{"ERROR": message}` otherwise.
pub fn result_document(result: &ExecResult<ExecutionResult>) -> Value {
    match result {
        Ok(result) => serde_json::to_value(result).unwrap_or_else(|e| error_document(&e)),
        Err(e) => error_document(e),
    }
}

/// `{"ERROR": message}`.
pub fn error_document(error: &dyn std::fmt::Display) -> Value {
    json!({ "ERROR": error.to_string() })
}

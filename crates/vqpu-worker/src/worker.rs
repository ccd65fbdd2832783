//! QPU worker: receives task messages and answers with result documents.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use vqpu_comm::{ClassicalChannel, DiscoveryStore, Endpoint, RankFabric, WaitPolicy, wait_for};
use vqpu_exec::{ShotAggregator, error_document};
use vqpu_hal::SimulationEngine;
use vqpu_ir::{IrError, QuantumTask, TaskMessage};

use crate::config::WorkerConfig;
use crate::error::{WorkerError, WorkerResult};

/// Create the configured engine.
pub fn build_engine(config: &WorkerConfig) -> WorkerResult<Box<dyn SimulationEngine>> {
    let registry = vqpu_adapter_sim::default_registry();
    Ok(registry.create(config.engine_config())?)
}

/// Where a worker looks up the endpoints of the peers its tasks name.
#[derive(Clone)]
pub struct PeerDirectory {
    store: Arc<dyn DiscoveryStore>,
    job_id: String,
    policy: WaitPolicy,
}

impl PeerDirectory {
    /// Peers are published as `<job_id>_<task id>`.
    pub fn new(store: Arc<dyn DiscoveryStore>, job_id: impl Into<String>, policy: WaitPolicy) -> Self {
        Self {
            store,
            job_id: job_id.into(),
            policy,
        }
    }

    /// Discovery key for `name`.
    pub fn key(&self, name: &str) -> String {
        format!("{}_{}", self.job_id, name)
    }

    /// Replace every task-id peer in `task` with its published endpoint.
    ///
    /// Names that already are endpoints are left alone. Waits until each
    /// peer has published.
    pub async fn resolve(&self, task: &mut QuantumTask) -> WorkerResult<()> {
        let mut resolved = HashMap::new();
        for name in task.peer_names() {
            if is_endpoint(&name) {
                continue;
            }
            let record = wait_for(self.store.as_ref(), &self.key(&name), self.policy).await?;
            debug!(peer = %name, endpoint = %record.communications_endpoint, "Peer resolved");
            resolved.insert(name, record.communications_endpoint.as_str().to_string());
        }
        if !resolved.is_empty() {
            task.map_peers(|peer| resolved.get(peer).cloned().unwrap_or_else(|| peer.to_string()));
        }
        Ok(())
    }
}

fn is_endpoint(name: &str) -> bool {
    Endpoint::new(name).rank().is_some() || name.contains("://")
}

/// A worker hosting one task at a time.
///
/// A circuit message replaces the current task, a parameter update rewrites
/// its angles; either is followed by a full run.
pub struct QpuWorker {
    aggregator: ShotAggregator,
    directory: Option<PeerDirectory>,
    current: Option<QuantumTask>,
}

impl QpuWorker {
    /// Create a worker without a classical channel.
    pub fn new(engine: Box<dyn SimulationEngine>) -> Self {
        Self {
            aggregator: ShotAggregator::new(engine),
            directory: None,
            current: None,
        }
    }

    /// Attach the worker's classical channel.
    #[must_use]
    pub fn with_channel(mut self, channel: Arc<dyn ClassicalChannel>) -> Self {
        self.aggregator = self.aggregator.with_channel(channel);
        self
    }

    /// Resolve peer names of incoming circuits through `directory`.
    #[must_use]
    pub fn with_directory(mut self, directory: PeerDirectory) -> Self {
        self.directory = Some(directory);
        self
    }

    /// The loaded task.
    pub fn current(&self) -> Option<&QuantumTask> {
        self.current.as_ref()
    }

    /// Handle one message; failures become `{"ERROR": message}`.
    #[instrument(skip(self, message), fields(len = message.len()))]
    pub async fn handle_message(&mut self, message: &str) -> Value {
        match self.try_handle(message).await {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Rejected message: {}", e);
                error_document(&e)
            }
        }
    }

    async fn try_handle(&mut self, message: &str) -> WorkerResult<Value> {
        match TaskMessage::parse(message)? {
            TaskMessage::Circuit(mut task) => {
                if let Some(directory) = &self.directory {
                    directory.resolve(&mut task).await?;
                }
                info!(task = %task.id, "Circuit loaded");
                self.current = Some(task);
            }
            params @ TaskMessage::Params(_) => params.apply(&mut self.current)?,
        }
        let task = self.current.clone().ok_or(IrError::NoCircuitLoaded)?;
        Ok(self.execute(task).await)
    }

    /// Load `task` as is and run it.
    pub async fn run_task(&mut self, task: QuantumTask) -> Value {
        self.current = Some(task.clone());
        self.execute(task).await
    }

    async fn execute(&mut self, task: QuantumTask) -> Value {
        self.aggregator.clear();
        self.aggregator.add_task(task);
        let doc = self.aggregator.run_document().await;
        self.aggregator.clear();
        doc
    }
}

/// Run a classical-communication group in this process, one worker per rank.
///
/// Peers named by task id are rewritten to the rank of that task. Result
/// documents come back in task order.
pub async fn run_rank_group(
    mut tasks: Vec<QuantumTask>,
    config: &WorkerConfig,
) -> WorkerResult<Vec<Value>> {
    let ranks: HashMap<String, String> = tasks
        .iter()
        .enumerate()
        .map(|(rank, task)| (task.id.clone(), Endpoint::from_rank(rank).as_str().to_string()))
        .collect();
    if ranks.len() != tasks.len() {
        return Err(WorkerError::Protocol(
            "task ids in a rank group must be unique".to_string(),
        ));
    }
    for task in &mut tasks {
        task.map_peers(|peer| ranks.get(peer).cloned().unwrap_or_else(|| peer.to_string()));
    }

    let channels = RankFabric::create(tasks.len());
    info!(ranks = channels.len(), "Starting rank group");
    let mut handles = Vec::with_capacity(tasks.len());
    for (task, channel) in tasks.into_iter().zip(channels) {
        let mut worker = QpuWorker::new(build_engine(config)?).with_channel(Arc::new(channel));
        handles.push(tokio::spawn(async move { worker.run_task(task).await }));
    }

    let mut docs = Vec::with_capacity(handles.len());
    for handle in handles {
        let doc = handle
            .await
            .map_err(|e| WorkerError::Protocol(format!("rank worker failed: {e}")))?;
        docs.push(doc);
    }
    Ok(docs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vqpu_comm::MemoryDiscovery;
    use vqpu_ir::{Gate, Instruction};

    fn worker() -> QpuWorker {
        QpuWorker::new(build_engine(&WorkerConfig::default()).unwrap())
    }

    const RY_TASK: &str = r#"{
        "id": "ry",
        "config": {"shots": 100, "num_qubits": 1, "num_clbits": 1, "seed": 3},
        "instructions": [
            {"name": "ry", "qubits": [0], "params": [0.0]},
            {"name": "measure", "qubits": [0], "clbits": [0]}
        ]
    }"#;

    #[test]
    fn test_is_endpoint() {
        assert!(is_endpoint("3"));
        assert!(is_endpoint("tcp://10.0.0.1:6000"));
        assert!(!is_endpoint("circuito2"));
    }

    #[tokio::test]
    async fn test_circuit_then_params() {
        let mut worker = worker();
        let doc = worker.handle_message(RY_TASK).await;
        assert_eq!(doc["counts"]["0"], 100);

        let doc = worker
            .handle_message(r#"{"params": [3.141592653589793]}"#)
            .await;
        assert_eq!(doc["counts"]["1"], 100);
        assert_eq!(worker.current().unwrap().id, "ry");
    }

    #[tokio::test]
    async fn test_params_before_circuit() {
        let mut worker = worker();
        let doc = worker.handle_message(r#"{"params": [1.0]}"#).await;
        assert!(doc["ERROR"].is_string());
    }

    #[tokio::test]
    async fn test_keeps_serving_after_error() {
        let mut worker = worker();
        let doc = worker.handle_message("not json").await;
        assert!(doc.get("ERROR").is_some());
        let doc = worker.handle_message(RY_TASK).await;
        assert_eq!(doc["counts"]["0"], 100);
    }

    #[tokio::test]
    async fn test_directory_resolves_task_ids() {
        let store = Arc::new(MemoryDiscovery::new());
        store
            .publish("job_b", &Endpoint::tcp("10.1.0.2", 6001))
            .await
            .unwrap();
        let directory = PeerDirectory::new(store, "job", WaitPolicy::default());

        let mut task = QuantumTask::new(
            "a",
            1,
            0,
            vec![
                Instruction::measure_and_send(0, "b"),
                Instruction::measure_and_send(0, "2"),
            ],
        )
        .sending_to("b");
        directory.resolve(&mut task).await.unwrap();
        assert_eq!(task.peer_names(), vec!["2", "tcp://10.1.0.2:6001"]);
    }

    #[tokio::test]
    async fn test_directory_gives_up() {
        let store = Arc::new(MemoryDiscovery::new());
        let policy = WaitPolicy {
            interval: std::time::Duration::from_millis(1),
            max_attempts: Some(3),
        };
        let directory = PeerDirectory::new(store, "job", policy);
        let mut task = QuantumTask::new("a", 1, 0, vec![Instruction::measure_and_send(0, "b")]);
        let err = directory.resolve(&mut task).await.unwrap_err();
        assert!(matches!(err, WorkerError::Comm(_)));
    }

    #[tokio::test]
    async fn test_rank_group_rejects_duplicate_ids() {
        let tasks = vec![
            QuantumTask::new("a", 1, 0, vec![Instruction::gate(Gate::X, [0])]),
            QuantumTask::new("a", 1, 0, vec![]),
        ];
        let err = run_rank_group(tasks, &WorkerConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkerError::Protocol(_)));
    }
}

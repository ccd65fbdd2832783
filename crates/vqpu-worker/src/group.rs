//! Quantum-communication group hosting.
//!
//! Tasks that teleport qubits to each other must share one combined register,
//! so one executor process simulates the whole group. Members publish
//! themselves, send their circuit to the executor each round and wait for the
//! combined result:
//!
//! ```text
//! member 0 ──circuit──┐                 ┌──result──> member 0
//! member 1 ──circuit──┼──> executor ────┼──result──> member 1
//! member 2 ──(empty)──┘   (one shot     └─ (nothing for member 2)
//!                          scheduler)
//! ```

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use vqpu_comm::{ClassicalChannel, DiscoveryStore, Endpoint, WaitPolicy, wait_for, wait_for_prefix};
use vqpu_exec::{ShotAggregator, error_document};
use vqpu_hal::SimulationEngine;
use vqpu_ir::TaskMessage;

use crate::error::{WorkerError, WorkerResult};

/// Discovery key of a group's executor.
pub fn executor_key(job_id: &str) -> String {
    format!("{job_id}_executor")
}

/// Discovery key of a group member.
pub fn member_key(job_id: &str, local_id: &str) -> String {
    format!("{job_id}_{local_id}")
}

/// Hosts every task of a quantum-communication group.
pub struct GroupExecutor {
    job_id: String,
    group_size: usize,
    channel: Arc<dyn ClassicalChannel>,
    aggregator: ShotAggregator,
    members: Vec<Endpoint>,
}

impl GroupExecutor {
    /// Create an executor for `group_size` members of `job_id`.
    pub fn new(
        job_id: impl Into<String>,
        group_size: usize,
        channel: Arc<dyn ClassicalChannel>,
        engine: Box<dyn SimulationEngine>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            group_size,
            channel,
            aggregator: ShotAggregator::new(engine),
            members: Vec::new(),
        }
    }

    /// Members found by [`GroupExecutor::assemble`], ordered by key.
    pub fn members(&self) -> &[Endpoint] {
        &self.members
    }

    /// Publish, wait for every member to publish, connect to each.
    #[instrument(skip(self, store), fields(job = %self.job_id, size = self.group_size))]
    pub async fn assemble(&mut self, store: &dyn DiscoveryStore, policy: WaitPolicy) -> WorkerResult<()> {
        let own_key = executor_key(&self.job_id);
        self.channel.publish(store, &own_key).await?;

        let prefix = format!("{}_", self.job_id);
        let entries = wait_for_prefix(store, &prefix, self.group_size + 1, policy).await?;
        self.members = entries
            .into_iter()
            .filter(|(key, _)| *key != own_key)
            .map(|(_, record)| record.communications_endpoint)
            .collect();
        self.channel.connect_all(&self.members).await?;
        info!(members = self.members.len(), "Group assembled");
        Ok(())
    }

    /// Serve one round: collect one message per member, run, reply.
    ///
    /// Returns the number of tasks executed. Members that sent nothing get
    /// no reply; members whose message was unusable get an error document.
    pub async fn serve_round(&mut self) -> WorkerResult<usize> {
        let members = self.members.clone();
        let mut contributors = Vec::new();
        self.aggregator.clear();

        for member in &members {
            let message = self.channel.recv_info(member).await?;
            if message.is_empty() {
                debug!(%member, "Member skipped round");
                continue;
            }
            match TaskMessage::parse(&message) {
                Ok(TaskMessage::Circuit(task)) => {
                    debug!(%member, task = %task.id, "Circuit received");
                    self.aggregator.add_task(task);
                    contributors.push(member.clone());
                }
                Ok(TaskMessage::Params(_)) => {
                    let e = WorkerError::Protocol(
                        "group members must send full circuits".to_string(),
                    );
                    reply(self.channel.as_ref(), member, &error_document(&e)).await?;
                }
                Err(e) => {
                    warn!(%member, "Invalid circuit: {}", e);
                    reply(self.channel.as_ref(), member, &error_document(&e)).await?;
                }
            }
        }

        if contributors.is_empty() {
            return Ok(0);
        }

        let doc = self.aggregator.run_document().await;
        for member in &contributors {
            reply(self.channel.as_ref(), member, &doc).await?;
        }
        self.aggregator.clear();
        info!(tasks = contributors.len(), "Round complete");
        Ok(contributors.len())
    }

    /// Serve rounds until a channel error.
    pub async fn serve(&mut self) -> WorkerResult<()> {
        loop {
            self.serve_round().await?;
        }
    }
}

async fn reply(
    channel: &dyn ClassicalChannel,
    member: &Endpoint,
    doc: &Value,
) -> WorkerResult<()> {
    channel.send_info(&doc.to_string(), member).await?;
    Ok(())
}

/// One task of a quantum-communication group.
pub struct GroupMember {
    job_id: String,
    local_id: String,
    channel: Arc<dyn ClassicalChannel>,
    executor: Option<Endpoint>,
}

impl GroupMember {
    /// Create member `local_id` of `job_id`.
    pub fn new(
        job_id: impl Into<String>,
        local_id: impl Into<String>,
        channel: Arc<dyn ClassicalChannel>,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            local_id: local_id.into(),
            channel,
            executor: None,
        }
    }

    /// Publish, then wait for the executor and connect to it.
    #[instrument(skip(self, store), fields(job = %self.job_id, member = %self.local_id))]
    pub async fn join(&mut self, store: &dyn DiscoveryStore, policy: WaitPolicy) -> WorkerResult<()> {
        self.channel
            .publish(store, &member_key(&self.job_id, &self.local_id))
            .await?;
        let record = wait_for(store, &executor_key(&self.job_id), policy).await?;
        self.channel.connect(&record.communications_endpoint).await?;
        debug!(executor = %record.communications_endpoint, "Joined group");
        self.executor = Some(record.communications_endpoint);
        Ok(())
    }

    fn executor(&self) -> WorkerResult<&Endpoint> {
        self.executor
            .as_ref()
            .ok_or_else(|| WorkerError::Protocol("member has not joined its group".to_string()))
    }

    /// Send a circuit document and wait for the group's result.
    pub async fn submit(&self, circuit: &str) -> WorkerResult<Value> {
        let executor = self.executor()?;
        self.channel.send_info(circuit, executor).await?;
        let reply = self.channel.recv_info(executor).await?;
        Ok(serde_json::from_str(&reply)?)
    }

    /// Contribute nothing to the current round.
    pub async fn skip_round(&self) -> WorkerResult<()> {
        let executor = self.executor()?;
        self.channel.send_info("", executor).await?;
        Ok(())
    }
}

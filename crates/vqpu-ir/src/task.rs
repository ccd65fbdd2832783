//! Quantum tasks and the messages that load or update them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::error::{IrError, IrResult};
use crate::instruction::{Instruction, Operation};

fn default_shots() -> u64 {
    1024
}

fn default_method() -> String {
    "statevector".to_string()
}

/// Execution settings carried in a circuit document's `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Number of shots.
    #[serde(default = "default_shots")]
    pub shots: u64,
    /// Simulation method, used to pick an engine.
    #[serde(default = "default_method")]
    pub method: String,
    /// Qubits owned by the task.
    #[serde(default)]
    pub num_qubits: usize,
    /// Classical bits owned by the task.
    #[serde(default)]
    pub num_clbits: usize,
    /// Seed for reproducible sampling.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            shots: default_shots(),
            method: default_method(),
            num_qubits: 0,
            num_clbits: 0,
            seed: None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTask {
    #[serde(default)]
    id: String,
    #[serde(default)]
    config: RunConfig,
    instructions: Vec<Value>,
    #[serde(default)]
    sending_to: Vec<String>,
    #[serde(default)]
    is_dynamic: bool,
    #[serde(default)]
    has_cc: bool,
}

/// One circuit to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct QuantumTask {
    /// Identifier, unique within a co-execution group.
    pub id: String,
    /// Execution settings.
    pub config: RunConfig,
    /// Instructions in execution order.
    pub instructions: Vec<Instruction>,
    /// Endpoints to connect before executing.
    pub sending_to: Vec<String>,
    /// Whether the circuit has mid-circuit measurements or conditionals.
    pub is_dynamic: bool,
    /// Whether the circuit uses classical communication.
    pub has_cc: bool,
}

impl QuantumTask {
    /// Create a task from decoded instructions.
    pub fn new(
        id: impl Into<String>,
        num_qubits: usize,
        num_clbits: usize,
        instructions: Vec<Instruction>,
    ) -> Self {
        Self {
            id: id.into(),
            config: RunConfig {
                num_qubits,
                num_clbits,
                ..RunConfig::default()
            },
            instructions,
            sending_to: vec![],
            is_dynamic: false,
            has_cc: false,
        }
    }

    /// Set the number of shots.
    #[must_use]
    pub fn with_shots(mut self, shots: u64) -> Self {
        self.config.shots = shots;
        self
    }

    /// Set the sampling seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Add an endpoint to connect before executing.
    #[must_use]
    pub fn sending_to(mut self, peer: impl Into<String>) -> Self {
        self.sending_to.push(peer.into());
        self
    }

    /// Decode a circuit document.
    pub fn from_json(json: &str) -> IrResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        Self::from_value(value)
    }

    /// Decode a circuit document from a parsed value.
    pub fn from_value(value: Value) -> IrResult<Self> {
        let raw: RawTask = serde_json::from_value(value)?;
        let instructions = Instruction::decode_all(raw.instructions)?;

        let mut config = raw.config;
        if config.num_qubits == 0 {
            config.num_qubits = instructions
                .iter()
                .flat_map(|inst| inst.qubits.iter().filter_map(|q| q.local()))
                .max()
                .map_or(0, |q| q + 1);
        }
        if config.num_clbits == 0 {
            config.num_clbits = instructions
                .iter()
                .filter(|inst| matches!(inst.op, Operation::Measure))
                .filter_map(|inst| inst.clbits.first().copied())
                .max()
                .map_or(0, |c| c + 1);
        }

        Ok(Self {
            id: raw.id,
            config,
            instructions,
            sending_to: raw.sending_to,
            is_dynamic: raw.is_dynamic,
            has_cc: raw.has_cc,
        })
    }

    /// Qubits owned by the task.
    #[inline]
    pub fn num_qubits(&self) -> usize {
        self.config.num_qubits
    }

    /// Classical bits owned by the task.
    #[inline]
    pub fn num_clbits(&self) -> usize {
        self.config.num_clbits
    }

    /// Number of angle values a parameter update must supply.
    pub fn parameter_count(&self) -> usize {
        self.instructions.iter().map(Instruction::angle_count).sum()
    }

    /// Rewrite the angle parameters in instruction order.
    pub fn update_params(&mut self, params: &[f64]) -> IrResult<()> {
        let expected = self.parameter_count();
        if params.len() < expected {
            return Err(IrError::ParameterCountMismatch {
                expected,
                got: params.len(),
            });
        }
        if params.len() > expected {
            warn!(
                task = %self.id,
                expected,
                got = params.len(),
                "Ignoring extra parameters in update"
            );
        }

        let slots = self.instructions.iter_mut().flat_map(Instruction::angles_mut);
        for (slot, value) in slots.zip(params) {
            *slot = *value;
        }
        Ok(())
    }

    /// Rewrite every partner identifier, including `sending_to`.
    pub fn map_peers(&mut self, f: impl Fn(&str) -> String) {
        for inst in &mut self.instructions {
            inst.map_peers(&f);
        }
        for peer in &mut self.sending_to {
            *peer = f(peer);
        }
    }

    /// Every partner identifier the task names, sorted and deduplicated.
    pub fn peer_names(&self) -> Vec<String> {
        fn collect(instructions: &[Instruction], out: &mut Vec<String>) {
            for inst in instructions {
                out.extend(inst.peers.iter().cloned());
                if let Operation::RControl(body) = &inst.op {
                    collect(body, out);
                }
            }
        }
        let mut names = self.sending_to.clone();
        collect(&self.instructions, &mut names);
        names.sort();
        names.dedup();
        names
    }

    /// Whether any instruction uses an in-process partner task.
    pub fn uses_teleportation(&self) -> bool {
        self.instructions.iter().any(|inst| inst.op.is_cross_task())
    }

    /// Whether any instruction uses the classical channel.
    pub fn uses_classical_channel(&self) -> bool {
        self.instructions.iter().any(|inst| inst.op.is_cross_process())
    }
}

/// A message sent to a worker.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskMessage {
    /// A full circuit replacing the current one.
    Circuit(QuantumTask),
    /// New angle values for the current circuit.
    Params(Vec<f64>),
}

impl TaskMessage {
    /// Decode a message.
    pub fn parse(json: &str) -> IrResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        let is_circuit = value.get("instructions").is_some() && value.get("config").is_some();
        if is_circuit {
            return QuantumTask::from_value(value).map(TaskMessage::Circuit);
        }
        match value.get("params") {
            Some(params) => Ok(TaskMessage::Params(serde_json::from_value(params.clone())?)),
            None => Err(IrError::InvalidMessage(
                "expected 'instructions' and 'config', or 'params'".into(),
            )),
        }
    }

    /// Apply the message to the currently loaded task.
    pub fn apply(self, current: &mut Option<QuantumTask>) -> IrResult<()> {
        match self {
            TaskMessage::Circuit(task) => {
                *current = Some(task);
                Ok(())
            }
            TaskMessage::Params(params) => current
                .as_mut()
                .ok_or(IrError::NoCircuitLoaded)?
                .update_params(&params),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::Gate;

    const BELL: &str = r#"{
        "id": "bell",
        "config": {"shots": 100, "num_qubits": 2, "num_clbits": 2, "seed": 7},
        "instructions": [
            {"name": "h", "qubits": [0]},
            {"name": "cx", "qubits": [0, 1]},
            {"name": "measure", "qubits": [0], "clbits": [0]},
            {"name": "measure", "qubits": [1], "clbits": [1]}
        ]
    }"#;

    #[test]
    fn test_from_json() {
        let task = QuantumTask::from_json(BELL).unwrap();
        assert_eq!(task.id, "bell");
        assert_eq!(task.config.shots, 100);
        assert_eq!(task.config.method, "statevector");
        assert_eq!(task.config.seed, Some(7));
        assert_eq!(task.instructions.len(), 4);
        assert!(!task.uses_teleportation());
    }

    #[test]
    fn test_counts_inferred_when_absent() {
        let task = QuantumTask::from_json(
            r#"{"config": {}, "instructions": [
                {"name": "x", "qubits": [2]},
                {"name": "measure", "qubits": [2], "clbits": [1]}
            ]}"#,
        )
        .unwrap();
        assert_eq!(task.num_qubits(), 3);
        assert_eq!(task.num_clbits(), 2);
        assert_eq!(task.config.shots, 1024);
    }

    #[test]
    fn test_param_update_in_order() {
        let mut slot = None;
        let circuit = r#"{
            "id": "vqe",
            "config": {"num_qubits": 1},
            "instructions": [
                {"name": "rx", "qubits": [0], "params": [0.0]},
                {"name": "h", "qubits": [0]},
                {"name": "u", "qubits": [0], "params": [0.0, 0.0, 0.0]}
            ]
        }"#;
        TaskMessage::parse(circuit).unwrap().apply(&mut slot).unwrap();
        TaskMessage::parse(r#"{"params": [1.0, 2.0, 3.0, 4.0]}"#)
            .unwrap()
            .apply(&mut slot)
            .unwrap();

        let task = slot.unwrap();
        assert_eq!(task.instructions[0].op, Operation::Gate(Gate::Rx(1.0)));
        assert_eq!(task.instructions[2].op, Operation::Gate(Gate::U(2.0, 3.0, 4.0)));
    }

    #[test]
    fn test_param_update_errors() {
        let mut slot = None;
        let err = TaskMessage::parse(r#"{"params": [1.0]}"#)
            .unwrap()
            .apply(&mut slot)
            .unwrap_err();
        assert!(matches!(err, IrError::NoCircuitLoaded));

        let mut task = QuantumTask::new(
            "t",
            1,
            0,
            vec![Instruction::gate(Gate::U(0.0, 0.0, 0.0), [0])],
        );
        let err = task.update_params(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            IrError::ParameterCountMismatch {
                expected: 3,
                got: 1
            }
        ));
    }

    #[test]
    fn test_invalid_message() {
        let err = TaskMessage::parse(r#"{"foo": 1}"#).unwrap_err();
        assert!(matches!(err, IrError::InvalidMessage(_)));
    }

    #[test]
    fn test_map_peers() {
        let mut task = QuantumTask::new("a", 1, 0, vec![Instruction::qsend(0, "b")]).sending_to("b");
        task.map_peers(|p| format!("tcp://{p}:5000"));
        assert_eq!(task.instructions[0].peer(), Some("tcp://b:5000"));
        assert_eq!(task.sending_to, vec!["tcp://b:5000".to_string()]);
    }

    #[test]
    fn test_peer_names_include_nested() {
        let task = QuantumTask::new(
            "a",
            2,
            0,
            vec![
                Instruction::qsend(0, "c"),
                Instruction::rcontrol(vec![Instruction::gate(Gate::X, [1]).with_peer("d")], "b"),
            ],
        )
        .sending_to("c");
        assert_eq!(task.peer_names(), vec!["b", "c", "d"]);
    }
}

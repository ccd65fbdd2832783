//! Task instructions and their decoding from circuit documents.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{IrError, IrResult};
use crate::gate::Gate;
use crate::qubit::QubitRef;

/// Register that gates an instruction's execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Condition {
    /// Slot written by a local measurement.
    Local(usize),
    /// Slot written by a `recv` from another process.
    Remote(usize),
}

/// What an instruction does.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Apply a gate to the operand qubits.
    Gate(Gate),
    /// Measure the first operand.
    Measure,
    /// Return the first operand to |0⟩.
    Reset,
    /// No-op synchronization marker.
    Barrier,
    /// Measure the first operand and send the bit to the first peer.
    MeasureAndSend,
    /// Receive a bit from the first peer into a remote conditional register.
    Recv {
        /// Remote conditional register written by the received bit.
        register: usize,
    },
    /// Teleport the first operand to the first peer.
    QSend,
    /// Receive a teleported qubit from the first peer into the first operand.
    QRecv,
    /// Lend the first operand as control for the first peer's `rcontrol`.
    Expose,
    /// Apply the nested instructions using a control exposed by the first peer.
    RControl(Vec<Instruction>),
}

impl Operation {
    /// Whether the operation couples this task to another task or process.
    pub fn is_cross_task(&self) -> bool {
        matches!(
            self,
            Operation::QSend | Operation::QRecv | Operation::Expose | Operation::RControl(_)
        )
    }

    /// Whether the operation goes through the classical channel.
    pub fn is_cross_process(&self) -> bool {
        matches!(self, Operation::MeasureAndSend | Operation::Recv { .. })
    }
}

/// A decoded instruction with operands.
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Opcode name as written in the circuit document.
    pub name: String,
    /// The operation.
    pub op: Operation,
    /// Qubit operands, task-local.
    pub qubits: Vec<QubitRef>,
    /// Classical bits written by a measurement, task-local.
    pub clbits: Vec<usize>,
    /// Local conditional register written by a measurement.
    pub clreg: Option<usize>,
    /// Register that must be true for the instruction to take effect.
    pub condition: Option<Condition>,
    /// Partner endpoints or task ids.
    pub peers: Vec<String>,
}

/// Instruction object as it appears in a circuit document.
#[derive(Debug, Deserialize)]
struct RawInstruction {
    name: String,
    #[serde(default)]
    qubits: Vec<i64>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    clbits: Vec<usize>,
    #[serde(default)]
    clreg: Vec<usize>,
    #[serde(default)]
    conditional_reg: Option<Vec<usize>>,
    #[serde(default)]
    remote_conditional_reg: Option<Vec<usize>>,
    #[serde(default, alias = "circuits")]
    qpus: Vec<String>,
    #[serde(default)]
    instructions: Vec<RawInstruction>,
}

impl Instruction {
    fn new(name: impl Into<String>, op: Operation, qubits: Vec<QubitRef>) -> Self {
        Self {
            name: name.into(),
            op,
            qubits,
            clbits: vec![],
            clreg: None,
            condition: None,
            peers: vec![],
        }
    }

    /// Create a gate instruction.
    pub fn gate(gate: Gate, qubits: impl IntoIterator<Item = usize>) -> Self {
        let name = gate.name();
        Self::new(
            name,
            Operation::Gate(gate),
            qubits.into_iter().map(QubitRef::Local).collect(),
        )
    }

    /// Create a measurement of `qubit` into `clbit`.
    pub fn measure(qubit: usize, clbit: usize) -> Self {
        let mut inst = Self::new("measure", Operation::Measure, vec![QubitRef::Local(qubit)]);
        inst.clbits = vec![clbit];
        inst
    }

    /// Create a teleportation send of `qubit` to `peer`.
    pub fn qsend(qubit: usize, peer: impl Into<String>) -> Self {
        Self::new("qsend", Operation::QSend, vec![QubitRef::Local(qubit)]).with_peer(peer)
    }

    /// Create a teleportation receive into `qubit` from `peer`.
    pub fn qrecv(qubit: usize, peer: impl Into<String>) -> Self {
        Self::new("qrecv", Operation::QRecv, vec![QubitRef::Local(qubit)]).with_peer(peer)
    }

    /// Create a measure-and-send of `qubit` to `peer`.
    pub fn measure_and_send(qubit: usize, peer: impl Into<String>) -> Self {
        Self::new(
            "measure_and_send",
            Operation::MeasureAndSend,
            vec![QubitRef::Local(qubit)],
        )
        .with_peer(peer)
    }

    /// Create an expose of `qubit` as control for `peer`.
    pub fn expose(qubit: usize, peer: impl Into<String>) -> Self {
        Self::new("expose", Operation::Expose, vec![QubitRef::Local(qubit)]).with_peer(peer)
    }

    /// Create a remote-controlled body using the control exposed by `peer`.
    pub fn rcontrol(body: Vec<Instruction>, peer: impl Into<String>) -> Self {
        Self::new("rcontrol", Operation::RControl(body), vec![]).with_peer(peer)
    }

    /// Create a receive from `peer` into remote register `register`.
    pub fn recv(register: usize, peer: impl Into<String>) -> Self {
        Self::new("recv", Operation::Recv { register }, vec![]).with_peer(peer)
    }

    /// Add a partner endpoint.
    #[must_use]
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peers.push(peer.into());
        self
    }

    /// Gate the instruction on a register.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition = Some(condition);
        self
    }

    /// Store a measurement into a local conditional register.
    #[must_use]
    pub fn with_clreg(mut self, clreg: usize) -> Self {
        self.clreg = Some(clreg);
        self
    }

    /// Decode an instruction object.
    pub fn from_value(value: &Value) -> IrResult<Self> {
        let raw = RawInstruction::deserialize(value)?;
        Self::decode(raw, false)
    }

    pub(crate) fn decode_all(raw: Vec<Value>) -> IrResult<Vec<Self>> {
        raw.iter().map(Self::from_value).collect()
    }

    /// The first partner endpoint.
    pub fn peer(&self) -> Option<&str> {
        self.peers.first().map(String::as_str)
    }

    /// The first operand.
    pub fn target(&self) -> Option<QubitRef> {
        self.qubits.first().copied()
    }

    /// Rewrite partner identifiers, recursing into nested instructions.
    pub fn map_peers(&mut self, f: &impl Fn(&str) -> String) {
        for peer in &mut self.peers {
            *peer = f(peer);
        }
        if let Operation::RControl(body) = &mut self.op {
            for inst in body {
                inst.map_peers(f);
            }
        }
    }

    /// Number of angle values, recursing into nested instructions.
    pub fn angle_count(&self) -> usize {
        match &self.op {
            Operation::Gate(gate) => gate.angles().len(),
            Operation::RControl(body) => body.iter().map(Self::angle_count).sum(),
            _ => 0,
        }
    }

    /// Mutable angle slots in execution order, recursing into nested instructions.
    pub fn angles_mut(&mut self) -> Vec<&mut f64> {
        match &mut self.op {
            Operation::Gate(gate) => gate.angles_mut(),
            Operation::RControl(body) => body.iter_mut().flat_map(Self::angles_mut).collect(),
            _ => vec![],
        }
    }

    fn decode(raw: RawInstruction, nested: bool) -> IrResult<Self> {
        let name = raw.name.clone();
        let mut qubits = raw
            .qubits
            .iter()
            .map(|&q| match QubitRef::try_from(q)? {
                QubitRef::RemoteControl if !nested => Err(IrError::InvalidQubit(q)),
                r => Ok(r),
            })
            .collect::<IrResult<Vec<_>>>()?;

        let local = single_index(&name, raw.conditional_reg.as_deref())?;
        let remote = single_index(&name, raw.remote_conditional_reg.as_deref())?;
        let mut condition = match (local, remote) {
            (Some(_), Some(_)) => return Err(IrError::ConflictingConditions(name)),
            (Some(reg), None) => Some(Condition::Local(reg)),
            (None, Some(reg)) => Some(Condition::Remote(reg)),
            (None, None) => None,
        };

        let require_peer = || {
            if raw.qpus.is_empty() {
                Err(IrError::MissingField {
                    opcode: name.clone(),
                    field: "qpus",
                })
            } else {
                Ok(())
            }
        };
        let require_qubit = |qubits: &[QubitRef]| {
            if qubits.is_empty() {
                Err(IrError::MissingField {
                    opcode: name.clone(),
                    field: "qubits",
                })
            } else {
                Ok(())
            }
        };

        let op = match name.as_str() {
            "measure" => {
                require_qubit(&qubits)?;
                Operation::Measure
            }
            "reset" => {
                require_qubit(&qubits)?;
                Operation::Reset
            }
            "barrier" => Operation::Barrier,
            "measure_and_send" => {
                require_qubit(&qubits)?;
                require_peer()?;
                Operation::MeasureAndSend
            }
            "recv" => {
                require_peer()?;
                // The remote register is the destination here, not a guard.
                let register = remote.ok_or_else(|| IrError::MissingField {
                    opcode: name.clone(),
                    field: "remote_conditional_reg",
                })?;
                condition = local.map(Condition::Local);
                Operation::Recv { register }
            }
            "qsend" | "qrecv" | "expose" => {
                require_qubit(&qubits)?;
                require_peer()?;
                match name.as_str() {
                    "qsend" => Operation::QSend,
                    "qrecv" => Operation::QRecv,
                    _ => Operation::Expose,
                }
            }
            "rcontrol" => {
                require_peer()?;
                let body = raw
                    .instructions
                    .into_iter()
                    .map(|inner| Self::decode(inner, true))
                    .collect::<IrResult<Vec<_>>>()?;
                Operation::RControl(body)
            }
            other => {
                let (gate_name, remote_form) = if let Some(g) = other.strip_prefix("c_if_") {
                    (g, Some(false))
                } else if let Some(g) = other
                    .strip_prefix("remote_c_if_")
                    .or_else(|| other.strip_prefix("d_c_if_"))
                {
                    (g, Some(true))
                } else {
                    (other, None)
                };

                if !Gate::is_gate_name(gate_name) {
                    return Err(IrError::UnknownOpcode(name.clone()));
                }
                let gate = Gate::from_name(gate_name, raw.params.as_ref())?;

                if let Some(is_remote) = remote_form {
                    // Conditional forms list the register as a trailing operand.
                    let trailing = if qubits.len() == gate.num_qubits() + 1 {
                        qubits.pop().and_then(QubitRef::local)
                    } else {
                        None
                    };
                    if condition.is_none() {
                        let reg = trailing.ok_or_else(|| IrError::MissingField {
                            opcode: name.clone(),
                            field: if is_remote {
                                "remote_conditional_reg"
                            } else {
                                "conditional_reg"
                            },
                        })?;
                        condition = Some(if is_remote {
                            Condition::Remote(reg)
                        } else {
                            Condition::Local(reg)
                        });
                    }
                }

                if qubits.len() != gate.num_qubits() {
                    return Err(IrError::QubitCountMismatch {
                        gate_name: name.clone(),
                        expected: gate.num_qubits(),
                        got: qubits.len(),
                    });
                }
                Operation::Gate(gate)
            }
        };

        Ok(Self {
            name: raw.name,
            op,
            qubits,
            clbits: raw.clbits,
            clreg: raw.clreg.first().copied(),
            condition,
            peers: raw.qpus,
        })
    }
}

fn single_index(opcode: &str, reg: Option<&[usize]>) -> IrResult<Option<usize>> {
    match reg {
        None => Ok(None),
        Some([index]) => Ok(Some(*index)),
        Some(other) => Err(IrError::ConditionArity {
            opcode: opcode.to_string(),
            count: other.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_gate() {
        let inst = Instruction::from_value(&json!({"name": "cx", "qubits": [0, 1]})).unwrap();
        assert_eq!(inst.op, Operation::Gate(Gate::CX));
        assert_eq!(inst.qubits, vec![QubitRef::Local(0), QubitRef::Local(1)]);
        assert!(inst.condition.is_none());
    }

    #[test]
    fn test_decode_measure_with_clreg() {
        let inst = Instruction::from_value(
            &json!({"name": "measure", "qubits": [1], "clbits": [0], "clreg": [3]}),
        )
        .unwrap();
        assert_eq!(inst.op, Operation::Measure);
        assert_eq!(inst.clbits, vec![0]);
        assert_eq!(inst.clreg, Some(3));
    }

    #[test]
    fn test_conditional_gate() {
        let inst =
            Instruction::from_value(&json!({"name": "x", "qubits": [0], "conditional_reg": [2]}))
                .unwrap();
        assert_eq!(inst.condition, Some(Condition::Local(2)));

        let inst = Instruction::from_value(
            &json!({"name": "rz", "qubits": [0], "params": [0.3], "remote_conditional_reg": [1]}),
        )
        .unwrap();
        assert_eq!(inst.condition, Some(Condition::Remote(1)));
    }

    #[test]
    fn test_conflicting_conditions_rejected() {
        let err = Instruction::from_value(&json!({
            "name": "x", "qubits": [0], "conditional_reg": [0], "remote_conditional_reg": [0]
        }))
        .unwrap_err();
        assert!(matches!(err, IrError::ConflictingConditions(_)));

        let err = Instruction::from_value(
            &json!({"name": "x", "qubits": [0], "conditional_reg": [0, 1]}),
        )
        .unwrap_err();
        assert!(matches!(err, IrError::ConditionArity { count: 2, .. }));
    }

    #[test]
    fn test_c_if_drops_trailing_control() {
        let inst = Instruction::from_value(
            &json!({"name": "c_if_x", "qubits": [1, 0], "conditional_reg": [0]}),
        )
        .unwrap();
        assert_eq!(inst.op, Operation::Gate(Gate::X));
        assert_eq!(inst.qubits, vec![QubitRef::Local(1)]);
        assert_eq!(inst.condition, Some(Condition::Local(0)));

        let inst = Instruction::from_value(&json!({"name": "d_c_if_cx", "qubits": [0, 1, 4]}))
            .unwrap();
        assert_eq!(inst.qubits.len(), 2);
        assert_eq!(inst.condition, Some(Condition::Remote(4)));
    }

    #[test]
    fn test_recv_register_is_destination() {
        let inst = Instruction::from_value(
            &json!({"name": "recv", "qpus": ["B"], "remote_conditional_reg": [5]}),
        )
        .unwrap();
        assert_eq!(inst.op, Operation::Recv { register: 5 });
        assert!(inst.condition.is_none());

        let err = Instruction::from_value(&json!({"name": "recv", "qpus": ["B"]})).unwrap_err();
        assert!(matches!(err, IrError::MissingField { field: "remote_conditional_reg", .. }));
    }

    #[test]
    fn test_peers_alias() {
        let inst =
            Instruction::from_value(&json!({"name": "qsend", "qubits": [0], "circuits": ["b"]}))
                .unwrap();
        assert_eq!(inst.peer(), Some("b"));
        assert!(inst.op.is_cross_task());
    }

    #[test]
    fn test_rcontrol_nested_remote_qubit() {
        let inst = Instruction::from_value(&json!({
            "name": "rcontrol",
            "qpus": ["A"],
            "instructions": [{"name": "cx", "qubits": [-1, 0]}]
        }))
        .unwrap();
        let Operation::RControl(body) = &inst.op else {
            panic!("expected rcontrol");
        };
        assert_eq!(body[0].qubits, vec![QubitRef::RemoteControl, QubitRef::Local(0)]);

        let err = Instruction::from_value(&json!({"name": "x", "qubits": [-1]})).unwrap_err();
        assert!(matches!(err, IrError::InvalidQubit(-1)));
    }

    #[test]
    fn test_unknown_opcode() {
        let err = Instruction::from_value(&json!({"name": "teleport_all", "qubits": [0]}))
            .unwrap_err();
        assert!(matches!(err, IrError::UnknownOpcode(n) if n == "teleport_all"));
    }

    #[test]
    fn test_qubit_count_mismatch() {
        let err = Instruction::from_value(&json!({"name": "cx", "qubits": [0]})).unwrap_err();
        assert!(matches!(err, IrError::QubitCountMismatch { expected: 2, got: 1, .. }));
    }

    #[test]
    fn test_map_peers_recurses() {
        let mut inst = Instruction::from_value(&json!({
            "name": "rcontrol",
            "qpus": ["A"],
            "instructions": [{"name": "x", "qubits": [0]}]
        }))
        .unwrap();
        inst.map_peers(&|p| format!("{p}-mapped"));
        assert_eq!(inst.peer(), Some("A-mapped"));
    }
}

//! Decoding of complete circuit documents.

use vqpu_ir::{Condition, Gate, IrError, Operation, QuantumTask, QubitRef, TaskMessage};

// ---------------------------------------------------------------------------
// Teleportation pair
// ---------------------------------------------------------------------------

#[test]
fn teleportation_pair_decodes() {
    let sender = QuantumTask::from_json(
        r#"{
            "id": "circuito1",
            "config": {"shots": 1000, "num_qubits": 1, "num_clbits": 0, "seed": 11},
            "instructions": [
                {"name": "h", "qubits": [0]},
                {"name": "qsend", "qubits": [0], "qpus": ["circuito2"]}
            ]
        }"#,
    )
    .unwrap();
    let receiver = QuantumTask::from_json(
        r#"{
            "id": "circuito2",
            "config": {"shots": 1000, "num_qubits": 2, "num_clbits": 2},
            "instructions": [
                {"name": "qrecv", "qubits": [0], "qpus": ["circuito1"]},
                {"name": "cx", "qubits": [0, 1]},
                {"name": "measure", "qubits": [0], "clbits": [0]},
                {"name": "measure", "qubits": [1], "clbits": [1]}
            ]
        }"#,
    )
    .unwrap();

    assert!(sender.uses_teleportation());
    assert!(receiver.uses_teleportation());
    assert_eq!(sender.instructions[1].peer(), Some("circuito2"));
    assert_eq!(receiver.num_clbits(), 2);
    assert_eq!(receiver.instructions[0].target(), Some(QubitRef::Local(0)));
}

// ---------------------------------------------------------------------------
// Remote conditional pair
// ---------------------------------------------------------------------------

#[test]
fn remote_conditional_pair_decodes() {
    let task = QuantumTask::from_json(
        r#"{
            "id": "B",
            "config": {"num_qubits": 1, "num_clbits": 1},
            "sending_to": ["tcp://127.0.0.1:6001"],
            "has_cc": true,
            "instructions": [
                {"name": "recv", "qpus": ["tcp://127.0.0.1:6001"], "remote_conditional_reg": [0]},
                {"name": "x", "qubits": [0], "remote_conditional_reg": [0]},
                {"name": "measure", "qubits": [0], "clbits": [0]}
            ]
        }"#,
    )
    .unwrap();

    assert!(task.has_cc);
    assert!(task.uses_classical_channel());
    assert_eq!(task.instructions[0].op, Operation::Recv { register: 0 });
    assert_eq!(task.instructions[1].condition, Some(Condition::Remote(0)));
    assert_eq!(task.instructions[1].op, Operation::Gate(Gate::X));
}

// ---------------------------------------------------------------------------
// Malformed documents
// ---------------------------------------------------------------------------

#[test]
fn unknown_opcode_fails_the_whole_document() {
    let err = QuantumTask::from_json(
        r#"{"id": "bad", "config": {}, "instructions": [
            {"name": "h", "qubits": [0]},
            {"name": "warp", "qubits": [0]}
        ]}"#,
    )
    .unwrap_err();
    assert!(matches!(err, IrError::UnknownOpcode(name) if name == "warp"));
}

#[test]
fn missing_instructions_is_a_json_error() {
    let err = QuantumTask::from_json(r#"{"id": "bad", "config": {}}"#).unwrap_err();
    assert!(matches!(err, IrError::Json(_)));
}

#[test]
fn nested_parameters_are_updated() {
    let mut slot = None;
    TaskMessage::parse(
        r#"{"id": "t", "config": {"num_qubits": 1}, "instructions": [
            {"name": "rcontrol", "qpus": ["A"], "instructions": [
                {"name": "crz", "qubits": [-1, 0], "params": [0.0]}
            ]},
            {"name": "ry", "qubits": [0], "params": [0.0]}
        ]}"#,
    )
    .unwrap()
    .apply(&mut slot)
    .unwrap();
    TaskMessage::parse(r#"{"params": [0.25, 0.5]}"#)
        .unwrap()
        .apply(&mut slot)
        .unwrap();

    let task = slot.unwrap();
    let Operation::RControl(body) = &task.instructions[0].op else {
        panic!("expected rcontrol");
    };
    assert_eq!(body[0].op, Operation::Gate(Gate::CRz(0.25)));
    assert_eq!(task.instructions[1].op, Operation::Gate(Gate::Ry(0.5)));
}

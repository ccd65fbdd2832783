//! Virtual QPU Instruction Stream Model
//!
//! This crate decodes the circuit documents shipped to virtual QPU workers into
//! typed [`QuantumTask`]s. Each task is an ordered list of [`Instruction`]s whose
//! [`Operation`] is a closed set: plain gates, measurement, and the cross-task
//! and cross-process opcodes used for teleportation and remote conditionals.
//!
//! # Example
//!
//! ```rust
//! use vqpu_ir::{Operation, QuantumTask};
//!
//! let task = QuantumTask::from_json(r#"{
//!     "id": "circuito1",
//!     "config": {"shots": 1000, "num_qubits": 1, "num_clbits": 0},
//!     "instructions": [
//!         {"name": "h", "qubits": [0]},
//!         {"name": "qsend", "qubits": [0], "qpus": ["circuito2"]}
//!     ]
//! }"#).unwrap();
//!
//! assert_eq!(task.instructions.len(), 2);
//! assert_eq!(task.instructions[1].op, Operation::QSend);
//! ```
//!
//! # Opcodes
//!
//! | Opcode | Operands | Description |
//! |--------|----------|-------------|
//! | gates (`h`, `rx`, `cx`, `unitary`, ...) | 1-2 qubits | Applied at the task's offset |
//! | `c_if_<gate>` | targets + register | Gate guarded by a local register |
//! | `remote_c_if_<gate>`, `d_c_if_<gate>` | targets + register | Gate guarded by a remote register |
//! | `measure` | qubit, `clbits`, `clreg` | Records the outcome |
//! | `measure_and_send` | qubit, peer | Sends the outcome over the classical channel |
//! | `recv` | peer, register | Stores a received bit in a remote register |
//! | `qsend` / `qrecv` | qubit, peer | Teleports a qubit between co-scheduled tasks |
//! | `expose` / `rcontrol` | qubit / body, peer | Lends a qubit as control to another task |

pub mod error;
pub mod gate;
pub mod instruction;
pub mod qubit;
pub mod task;

pub use error::{IrError, IrResult};
pub use gate::Gate;
pub use instruction::{Condition, Instruction, Operation};
pub use qubit::QubitRef;
pub use task::{QuantumTask, RunConfig, TaskMessage};

//! Virtual QPU Shot Execution
//!
//! Co-executes several quantum tasks as one computation. Tasks hosted in the
//! same process share one combined register and hand qubits to each other
//! through teleportation; tasks in different processes exchange measurement
//! bits over a [`vqpu_comm::ClassicalChannel`].
//!
//! # Combined register
//!
//! ```text
//!  task 0 qubits | task 1 qubits | ... | link (N-2) | remote (N-1)
//! ```
//!
//! The two communication qubits exist only for groups of two or more tasks.
//!
//! # Scheduling
//!
//! [`run_shot`] visits the tasks round-robin. Each visit runs the instruction
//! under the task's cursor:
//!
//! | Opcode | Effect |
//! |--------|--------|
//! | gates, `measure`, `reset`, `barrier` | applied at the task's offset |
//! | `qsend` | Bell-measures the qubit, pushes two bits for the partner |
//! | `qrecv` | blocks until the partner's bits are pushed, then corrects and swaps |
//! | `expose` | cat-entangles the qubit with `remote`, waits for the partner's body |
//! | `rcontrol` | applies its body with `-1` bound to `remote`, disentangles |
//! | `measure_and_send` | sends one bit over the channel |
//! | `recv` | waits on the channel, stores the bit in a remote register |
//!
//! An instruction whose register guard reads false is consumed without effect.
//! A pass that moves no task forward is reported as [`ExecError::Deadlock`].
//!
//! # Example
//!
//! ```rust
//! use vqpu_adapter_sim::StatevectorEngine;
//! use vqpu_exec::ShotAggregator;
//! use vqpu_ir::{Gate, Instruction, QuantumTask};
//!
//! # tokio_test_block(async {
//! let sender = QuantumTask::new("circuito1", 1, 0, vec![
//!     Instruction::gate(Gate::H, [0]),
//!     Instruction::qsend(0, "circuito2"),
//! ]).with_shots(100).with_seed(7);
//! let receiver = QuantumTask::new("circuito2", 2, 2, vec![
//!     Instruction::qrecv(0, "circuito1"),
//!     Instruction::gate(Gate::CX, [0, 1]),
//!     Instruction::measure(0, 0),
//!     Instruction::measure(1, 1),
//! ]);
//!
//! let mut aggregator = ShotAggregator::new(Box::new(StatevectorEngine::new()));
//! aggregator.add_task(sender);
//! aggregator.add_task(receiver);
//! let result = aggregator.run().await.unwrap();
//! assert!(result.counts.keys().all(|k| k == "00" || k == "11"));
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod aggregate;
pub mod error;
mod remote;
pub mod scheduler;
pub mod state;
mod teleport;

pub use aggregate::{ShotAggregator, error_document, result_document};
pub use error::{ExecError, ExecResult};
pub use scheduler::run_shot;
pub use state::{CommQubits, GroupLayout};

//! Virtual QPU Workers
//!
//! Process-level plumbing around the shot scheduler: configuration, log
//! setup, the QPU worker message loop and quantum-communication group
//! hosting. The `vqpu` binary in this crate wires them to a command line.
//!
//! # Deployment shapes
//!
//! | Shape | Processes | Channel |
//! |-------|-----------|---------|
//! | isolated or teleporting tasks | one, [`vqpu_exec::ShotAggregator`] | none |
//! | classical-communication group | one [`QpuWorker`] per task | router or rank |
//! | quantum-communication group | [`GroupExecutor`] plus one [`GroupMember`] per task | router |
//!
//! Workers find each other through a [`vqpu_comm::DiscoveryStore`]; a QPU
//! worker publishes under `<job>_<task id>`, group members under
//! `<job>_<local id>` and the executor under `<job>_executor`.

pub mod config;
pub mod error;
pub mod group;
pub mod telemetry;
pub mod worker;

pub use config::{ConfigError, TransportKind, WorkerConfig, slurm_port};
pub use error::{WorkerError, WorkerResult};
pub use group::{GroupExecutor, GroupMember, executor_key, member_key};
pub use telemetry::{LogFormat, init_tracing};
pub use worker::{PeerDirectory, QpuWorker, build_engine, run_rank_group};

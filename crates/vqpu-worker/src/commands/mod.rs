//! CLI command implementations.

pub mod common;
pub mod executor;
pub mod member;
pub mod qpu;
pub mod ranks;
pub mod run;

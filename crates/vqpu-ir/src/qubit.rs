//! Qubit operands as they appear in task instructions.

use std::fmt;

use crate::error::{IrError, IrResult};

/// A qubit operand of an instruction.
///
/// Task circuits address their own qubits by local index. Inside the nested
/// body of a remote-controlled gate, index `-1` names the communication qubit
/// that carries the partner task's control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QubitRef {
    /// A qubit owned by the task, relative to the task's first qubit.
    Local(usize),
    /// The communication qubit holding a remotely exposed control.
    RemoteControl,
}

impl QubitRef {
    /// The local index, if this operand is a task-owned qubit.
    #[inline]
    pub fn local(self) -> Option<usize> {
        match self {
            QubitRef::Local(q) => Some(q),
            QubitRef::RemoteControl => None,
        }
    }
}

impl TryFrom<i64> for QubitRef {
    type Error = IrError;

    fn try_from(value: i64) -> IrResult<Self> {
        match value {
            -1 => Ok(QubitRef::RemoteControl),
            v if v >= 0 => usize::try_from(v)
                .map(QubitRef::Local)
                .map_err(|_| IrError::InvalidQubit(v)),
            v => Err(IrError::InvalidQubit(v)),
        }
    }
}

impl From<usize> for QubitRef {
    fn from(q: usize) -> Self {
        QubitRef::Local(q)
    }
}

impl fmt::Display for QubitRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QubitRef::Local(q) => write!(f, "q{q}"),
            QubitRef::RemoteControl => write!(f, "q[remote]"),
        }
    }
}

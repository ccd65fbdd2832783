//! Per-group layout and per-shot scheduler state.

use rustc_hash::FxHashMap;
use vqpu_ir::QuantumTask;

use crate::error::{ExecError, ExecResult};

/// The two reserved qubits at the top of a multi-task register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommQubits {
    /// `N-2`: the sender's half of the entangled pair.
    pub link: usize,
    /// `N-1`: the receiver's half, also the remote control of `rcontrol`.
    pub remote: usize,
}

/// Where each task lives inside the combined register.
///
/// Computed once per group and shared by every shot.
#[derive(Debug, Clone)]
pub struct GroupLayout {
    zero_qubits: Vec<usize>,
    clbit_offsets: Vec<usize>,
    index_by_id: FxHashMap<String, usize>,
    ids: Vec<String>,
    num_qubits: usize,
    num_clbits: usize,
    comm: Option<CommQubits>,
}

impl GroupLayout {
    /// Lay out tasks in order; groups of two or more get communication qubits.
    pub fn new(tasks: &[QuantumTask]) -> ExecResult<Self> {
        if tasks.is_empty() {
            return Err(ExecError::EmptyGroup);
        }

        let mut zero_qubits = Vec::with_capacity(tasks.len());
        let mut clbit_offsets = Vec::with_capacity(tasks.len());
        let mut index_by_id = FxHashMap::default();
        let mut num_qubits = 0;
        let mut num_clbits = 0;
        for (index, task) in tasks.iter().enumerate() {
            if index_by_id.insert(task.id.clone(), index).is_some() {
                return Err(ExecError::DuplicateTask(task.id.clone()));
            }
            zero_qubits.push(num_qubits);
            clbit_offsets.push(num_clbits);
            num_qubits += task.num_qubits();
            num_clbits += task.num_clbits();
        }

        let comm = (tasks.len() > 1).then(|| {
            num_qubits += 2;
            CommQubits {
                link: num_qubits - 2,
                remote: num_qubits - 1,
            }
        });

        Ok(Self {
            zero_qubits,
            clbit_offsets,
            index_by_id,
            ids: tasks.iter().map(|t| t.id.clone()).collect(),
            num_qubits,
            num_clbits,
            comm,
        })
    }

    /// Size of the combined register, communication qubits included.
    pub fn num_qubits(&self) -> usize {
        self.num_qubits
    }

    /// Length of the result bitstring.
    pub fn num_clbits(&self) -> usize {
        self.num_clbits
    }

    /// The communication qubits, if the group has them.
    pub fn comm(&self) -> Option<CommQubits> {
        self.comm
    }

    /// Position of a task's qubit 0 in the combined register.
    pub fn zero_qubit(&self, task: usize) -> usize {
        self.zero_qubits[task]
    }

    /// Position of a task's clbit 0 in the result bitstring.
    pub fn clbit_offset(&self, task: usize) -> usize {
        self.clbit_offsets[task]
    }

    /// Index of the task with this id.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index_by_id.get(id).copied()
    }

    /// Id of the task at `index`.
    pub fn id(&self, index: usize) -> &str {
        &self.ids[index]
    }

    /// Number of tasks.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Always false; a layout holds at least one task.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Why a task cannot make progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockReason {
    /// Waiting on a measurement pushed by a partner task.
    Partner,
    /// The communication qubits are held by an unfinished hand-off.
    CommBusy,
}

/// Cursor state of one task during a shot.
#[derive(Debug, Clone)]
pub(crate) struct TaskState {
    pub cursor: usize,
    pub blocked: Option<BlockReason>,
    pub finished: bool,
    /// Set between the two visits of an `expose`.
    pub cat_entangled: bool,
}

impl TaskState {
    pub fn new(task: &QuantumTask) -> Self {
        Self {
            cursor: 0,
            blocked: None,
            finished: task.instructions.is_empty(),
            cat_entangled: false,
        }
    }
}

/// A measurement result waiting for the partner task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pending {
    /// `qsend`: outcomes of the source qubit and of the link qubit.
    Teleport { source: bool, link: bool },
    /// `expose`: outcome of the link qubit.
    Exposed(bool),
    /// `rcontrol`: outcome of the X-basis measurement of the remote control.
    Disentangled(bool),
}

/// State shared by every task within one shot.
#[derive(Debug, Default)]
pub(crate) struct ShotContext {
    /// Local conditional registers.
    pub local_regs: FxHashMap<usize, bool>,
    /// Remote conditional registers written by `recv`.
    pub remote_regs: FxHashMap<usize, bool>,
    /// Measured classical bits, by position in the combined bitstring.
    pub clbits: FxHashMap<usize, bool>,
    /// Pending measurement stacks, by pushing task.
    pub pending: FxHashMap<usize, Vec<Pending>>,
    /// Whether the communication qubits carry a hand-off in flight.
    pub comm_busy: bool,
}

impl ShotContext {
    /// The shot's bitstring, clbit 0 rightmost, unmeasured bits `0`.
    pub fn bitstring(&self, num_clbits: usize) -> String {
        (0..num_clbits)
            .rev()
            .map(|i| {
                if self.clbits.get(&i).copied().unwrap_or(false) {
                    '1'
                } else {
                    '0'
                }
            })
            .collect()
    }
}

/// Outcome of visiting one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Flow {
    /// Done; move the cursor.
    Advance,
    /// Made progress but the same instruction runs again.
    Stay,
    /// No progress; park the task.
    Block(BlockReason),
}

#[cfg(test)]
mod tests {
    use super::*;
    use vqpu_ir::{Gate, Instruction};

    #[test]
    fn test_single_task_layout() {
        let task = QuantumTask::new("solo", 3, 2, vec![Instruction::gate(Gate::H, [0])]);
        let layout = GroupLayout::new(&[task]).unwrap();
        assert_eq!(layout.num_qubits(), 3);
        assert_eq!(layout.num_clbits(), 2);
        assert!(layout.comm().is_none());
    }

    #[test]
    fn test_group_layout_reserves_comm_qubits() {
        let a = QuantumTask::new("a", 1, 0, vec![]);
        let b = QuantumTask::new("b", 2, 2, vec![]);
        let layout = GroupLayout::new(&[a, b]).unwrap();

        assert_eq!(layout.num_qubits(), 5);
        assert_eq!(layout.zero_qubit(1), 1);
        assert_eq!(layout.clbit_offset(1), 0);
        assert_eq!(layout.comm(), Some(CommQubits { link: 3, remote: 4 }));
        assert_eq!(layout.index_of("b"), Some(1));
        assert_eq!(layout.id(0), "a");
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let a = QuantumTask::new("a", 1, 0, vec![]);
        let err = GroupLayout::new(&[a.clone(), a]).unwrap_err();
        assert!(matches!(err, ExecError::DuplicateTask(id) if id == "a"));
    }

    #[test]
    fn test_empty_group_rejected() {
        assert!(matches!(GroupLayout::new(&[]), Err(ExecError::EmptyGroup)));
    }

    #[test]
    fn test_bitstring_order() {
        let mut ctx = ShotContext::default();
        ctx.clbits.insert(0, true);
        ctx.clbits.insert(2, true);
        ctx.clbits.insert(9, true);
        assert_eq!(ctx.bitstring(4), "0101");
        assert_eq!(ctx.bitstring(0), "");
    }
}

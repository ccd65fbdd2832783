//! The shot scheduler.
//!
//! One shot interleaves every task's instruction stream round-robin over a
//! single combined register. Local instructions run immediately. Cross-task
//! instructions may park their task until a partner pushes the measurement
//! they need; a parked task is skipped until the partner unblocks it.
//! A full pass in which no task makes progress is a deadlock.

use tracing::trace;
use vqpu_comm::ClassicalChannel;
use vqpu_hal::SimulationEngine;
use vqpu_ir::{Condition, Gate, Instruction, IrError, Operation, QuantumTask, QubitRef};

use crate::error::{ExecError, ExecResult};
use crate::state::{BlockReason, Flow, GroupLayout, ShotContext, TaskState};

/// Run one shot of `tasks` on an already initialized register.
///
/// Returns the shot's bitstring, clbit 0 rightmost.
pub async fn run_shot<E>(
    tasks: &[QuantumTask],
    layout: &GroupLayout,
    engine: &mut E,
    channel: Option<&dyn ClassicalChannel>,
) -> ExecResult<String>
where
    E: SimulationEngine + ?Sized,
{
    let mut shot = Shot {
        tasks,
        layout,
        engine,
        channel,
        ctx: ShotContext::default(),
        states: tasks.iter().map(TaskState::new).collect(),
    };
    shot.run().await?;
    Ok(shot.ctx.bitstring(layout.num_clbits()))
}

/// Everything one shot touches.
pub(crate) struct Shot<'a, E: ?Sized> {
    pub tasks: &'a [QuantumTask],
    pub layout: &'a GroupLayout,
    pub engine: &'a mut E,
    pub channel: Option<&'a dyn ClassicalChannel>,
    pub ctx: ShotContext,
    pub states: Vec<TaskState>,
}

impl<E: SimulationEngine + ?Sized> Shot<'_, E> {
    async fn run(&mut self) -> ExecResult<()> {
        let tasks = self.tasks;
        while self.states.iter().any(|s| !s.finished) {
            let mut progressed = false;

            for index in 0..tasks.len() {
                let state = &self.states[index];
                if state.finished || state.blocked.is_some() {
                    continue;
                }
                let inst = &tasks[index].instructions[state.cursor];

                let flow = if self.condition_holds(inst) {
                    self.dispatch(index, inst).await?
                } else {
                    trace!(task = %tasks[index].id, opcode = %inst.name, "Condition false, skipping");
                    Flow::Advance
                };

                let state = &mut self.states[index];
                match flow {
                    Flow::Advance => {
                        progressed = true;
                        state.cursor += 1;
                        state.finished = state.cursor >= tasks[index].instructions.len();
                    }
                    Flow::Stay => progressed = true,
                    Flow::Block(reason) => {
                        trace!(task = %tasks[index].id, opcode = %inst.name, ?reason, "Blocked");
                        state.blocked = Some(reason);
                    }
                }
            }

            if !progressed {
                let blocked = self
                    .states
                    .iter()
                    .enumerate()
                    .filter(|(_, s)| !s.finished)
                    .map(|(i, _)| self.layout.id(i).to_string())
                    .collect();
                return Err(ExecError::Deadlock { blocked });
            }
        }
        Ok(())
    }

    /// Whether the instruction's register guard, if any, is set.
    ///
    /// A register that was never written reads as false.
    pub(crate) fn condition_holds(&self, inst: &Instruction) -> bool {
        match inst.condition {
            None => true,
            Some(Condition::Local(reg)) => self.ctx.local_regs.get(&reg).copied().unwrap_or(false),
            Some(Condition::Remote(reg)) => {
                self.ctx.remote_regs.get(&reg).copied().unwrap_or(false)
            }
        }
    }

    async fn dispatch(&mut self, task: usize, inst: &Instruction) -> ExecResult<Flow> {
        match &inst.op {
            Operation::Gate(gate) => {
                self.apply_gate(task, inst, gate)?;
                Ok(Flow::Advance)
            }
            Operation::Measure => {
                self.measure(task, inst)?;
                Ok(Flow::Advance)
            }
            Operation::Reset => {
                let qubit = self.target(task, inst)?;
                self.engine.reset(qubit)?;
                Ok(Flow::Advance)
            }
            Operation::Barrier => Ok(Flow::Advance),
            Operation::MeasureAndSend => self.measure_and_send(task, inst).await,
            Operation::Recv { register } => self.recv(task, inst, *register).await,
            Operation::QSend => self.qsend(task, inst),
            Operation::QRecv => self.qrecv(task, inst),
            Operation::Expose => self.expose(task, inst),
            Operation::RControl(body) => self.rcontrol(task, inst, body),
        }
    }

    /// Map an operand to its position in the combined register.
    pub(crate) fn resolve(&self, task: usize, qubit: QubitRef) -> ExecResult<usize> {
        match qubit {
            QubitRef::Local(q) => {
                let owned = self.tasks[task].num_qubits();
                if q >= owned {
                    return Err(ExecError::InvalidQubit {
                        task: self.layout.id(task).to_string(),
                        qubit: q,
                        num_qubits: owned,
                    });
                }
                Ok(self.layout.zero_qubit(task) + q)
            }
            QubitRef::RemoteControl => self
                .layout
                .comm()
                .map(|comm| comm.remote)
                .ok_or_else(|| ExecError::TeleportationUnavailable(self.layout.id(task).into())),
        }
    }

    /// The resolved first operand.
    pub(crate) fn target(&self, task: usize, inst: &Instruction) -> ExecResult<usize> {
        let qubit = inst.target().ok_or_else(|| IrError::MissingField {
            opcode: inst.name.clone(),
            field: "qubits",
        })?;
        self.resolve(task, qubit)
    }

    /// Index of the partner task named by the instruction.
    pub(crate) fn partner(&self, task: usize, inst: &Instruction) -> ExecResult<usize> {
        let peer = self.peer(task, inst)?;
        self.layout
            .index_of(peer)
            .ok_or_else(|| ExecError::UnknownTask(peer.to_string()))
    }

    /// The partner identifier named by the instruction.
    pub(crate) fn peer<'i>(&self, task: usize, inst: &'i Instruction) -> ExecResult<&'i str> {
        inst.peer().ok_or_else(|| ExecError::MissingPeer {
            task: self.layout.id(task).to_string(),
            opcode: inst.name.clone(),
        })
    }

    pub(crate) fn apply_gate(
        &mut self,
        task: usize,
        inst: &Instruction,
        gate: &Gate,
    ) -> ExecResult<()> {
        let qubits = inst
            .qubits
            .iter()
            .map(|&q| self.resolve(task, q))
            .collect::<ExecResult<Vec<_>>>()?;
        self.engine.apply_gate(gate, &qubits)?;
        Ok(())
    }

    fn measure(&mut self, task: usize, inst: &Instruction) -> ExecResult<bool> {
        let qubit = self.target(task, inst)?;
        let bit = self.engine.measure(qubit)?;
        let local = inst.target().and_then(QubitRef::local);
        self.record(task, inst, local, bit)?;
        Ok(bit)
    }

    /// Store a measurement outcome in the bitstring and the conditional registers.
    ///
    /// The bit lands at the task's clbit offset plus `clbits[0]`, or plus the
    /// local qubit index when no clbit is named. The register is `clreg` when
    /// present, else the same clbit index. Either way the clbit must belong
    /// to the task.
    pub(crate) fn record(
        &mut self,
        task: usize,
        inst: &Instruction,
        local: Option<usize>,
        bit: bool,
    ) -> ExecResult<()> {
        let clbit = inst.clbits.first().copied().or(local);
        if let Some(clbit) = clbit {
            let owned = self.tasks[task].num_clbits();
            if clbit >= owned {
                return Err(ExecError::InvalidClbit {
                    task: self.layout.id(task).to_string(),
                    clbit,
                    num_clbits: owned,
                });
            }
            self.ctx
                .clbits
                .insert(self.layout.clbit_offset(task) + clbit, bit);
        }
        if let Some(reg) = inst.clreg.or(clbit) {
            self.ctx.local_regs.insert(reg, bit);
        }
        Ok(())
    }

    /// Clear `Partner` blocks on `task`.
    pub(crate) fn unblock(&mut self, task: usize) {
        let state = &mut self.states[task];
        if state.blocked == Some(BlockReason::Partner) {
            state.blocked = None;
        }
    }

    /// Release the communication qubits and wake tasks waiting for them.
    pub(crate) fn release_comm(&mut self) {
        self.ctx.comm_busy = false;
        for state in &mut self.states {
            if state.blocked == Some(BlockReason::CommBusy) {
                state.blocked = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vqpu_adapter_sim::StatevectorEngine;

    async fn shot(tasks: &[QuantumTask], seed: u64) -> ExecResult<String> {
        let layout = GroupLayout::new(tasks)?;
        let mut engine = StatevectorEngine::with_seed(seed);
        engine.initialize(layout.num_qubits())?;
        run_shot(tasks, &layout, &mut engine, None).await
    }

    #[tokio::test]
    async fn test_deterministic_circuit() {
        let task = QuantumTask::new(
            "t",
            2,
            2,
            vec![
                Instruction::gate(Gate::X, [0]),
                Instruction::gate(Gate::CX, [0, 1]),
                Instruction::measure(0, 0),
                Instruction::measure(1, 1),
            ],
        );
        assert_eq!(shot(&[task], 1).await.unwrap(), "11");
    }

    #[tokio::test]
    async fn test_clbit_zero_is_rightmost() {
        let task = QuantumTask::new(
            "t",
            2,
            2,
            vec![
                Instruction::gate(Gate::X, [1]),
                Instruction::measure(0, 0),
                Instruction::measure(1, 1),
            ],
        );
        assert_eq!(shot(&[task], 1).await.unwrap(), "10");
    }

    #[tokio::test]
    async fn test_conditional_skip_on_unset_register() {
        let task = QuantumTask::new(
            "t",
            1,
            1,
            vec![
                Instruction::gate(Gate::X, [0]).with_condition(Condition::Local(5)),
                Instruction::gate(Gate::X, [0]).with_condition(Condition::Remote(2)),
                Instruction::measure(0, 0),
            ],
        );
        assert_eq!(shot(&[task], 1).await.unwrap(), "0");
    }

    #[tokio::test]
    async fn test_conditional_applies_after_measurement() {
        let task = QuantumTask::new(
            "t",
            2,
            2,
            vec![
                Instruction::gate(Gate::X, [0]),
                Instruction::measure(0, 0).with_clreg(3),
                Instruction::gate(Gate::X, [1]).with_condition(Condition::Local(3)),
                Instruction::measure(1, 1),
            ],
        );
        assert_eq!(shot(&[task], 1).await.unwrap(), "11");
    }

    #[tokio::test]
    async fn test_invalid_qubit() {
        let task = QuantumTask::new("t", 1, 0, vec![Instruction::gate(Gate::H, [1])]);
        let layout = GroupLayout::new(std::slice::from_ref(&task)).unwrap();
        let mut engine = StatevectorEngine::with_seed(0);
        // Room for the bad operand so the scheduler, not the engine, rejects it.
        engine.initialize(2).unwrap();
        let err = run_shot(&[task], &layout, &mut engine, None)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecError::InvalidQubit { qubit: 1, num_qubits: 1, .. }));
    }

    #[tokio::test]
    async fn test_clbit_outside_task_register() {
        let a = QuantumTask::new(
            "a",
            1,
            1,
            vec![Instruction::gate(Gate::X, [0]), Instruction::measure(0, 1)],
        );
        let b = QuantumTask::new("b", 1, 1, vec![]);
        let err = shot(&[a, b], 1).await.unwrap_err();
        assert!(matches!(
            err,
            ExecError::InvalidClbit { ref task, clbit: 1, num_clbits: 1 } if task == "a"
        ));
    }

    #[tokio::test]
    async fn test_unnamed_clbit_falls_back_to_owned_qubit() {
        let mut measure = Instruction::measure(1, 0);
        measure.clbits.clear();
        let task = QuantumTask::new("t", 2, 1, vec![Instruction::gate(Gate::X, [1]), measure]);
        let err = shot(&[task], 1).await.unwrap_err();
        assert!(matches!(err, ExecError::InvalidClbit { clbit: 1, num_clbits: 1, .. }));

        let mut measure = Instruction::measure(0, 0);
        measure.clbits.clear();
        let task = QuantumTask::new("t", 2, 2, vec![Instruction::gate(Gate::X, [0]), measure]);
        assert_eq!(shot(&[task], 1).await.unwrap(), "01");
    }

    #[tokio::test]
    async fn test_cross_process_opcode_without_channel() {
        let task = QuantumTask::new("t", 1, 0, vec![Instruction::measure_and_send(0, "1")]);
        let err = shot(&[task], 1).await.unwrap_err();
        assert!(matches!(err, ExecError::MissingChannel(op) if op == "measure_and_send"));
    }

    #[tokio::test]
    async fn test_mutual_wait_is_deadlock() {
        let a = QuantumTask::new("a", 1, 0, vec![Instruction::qrecv(0, "b")]);
        let b = QuantumTask::new("b", 1, 0, vec![Instruction::qrecv(0, "a")]);
        let err = shot(&[a, b], 1).await.unwrap_err();
        match err {
            ExecError::Deadlock { blocked } => assert_eq!(blocked, vec!["a", "b"]),
            other => panic!("expected deadlock, got {other}"),
        }
    }
}

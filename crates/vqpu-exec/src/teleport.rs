//! In-process qubit hand-off between co-scheduled tasks.
//!
//! Both protocols run on the two communication qubits at the top of the
//! combined register: `link` (`N-2`) and `remote` (`N-1`). The tasks never
//! share a two-qubit gate; they only exchange measurement outcomes through the
//! shot's pending stacks.
//!
//! `qsend` / `qrecv` teleport a qubit. `expose` / `rcontrol` lend a qubit as
//! the control of gates the partner applies (cat-entangle, controlled body,
//! cat-disentangle). While a hand-off is in flight the communication qubits
//! are busy and a second one waits.

use tracing::debug;
use vqpu_hal::SimulationEngine;
use vqpu_ir::{Gate, Instruction, Operation};

use crate::error::{ExecError, ExecResult};
use crate::scheduler::Shot;
use crate::state::{BlockReason, CommQubits, Flow, Pending};

impl<E: SimulationEngine + ?Sized> Shot<'_, E> {
    fn comm(&self, task: usize) -> ExecResult<CommQubits> {
        self.layout
            .comm()
            .ok_or_else(|| ExecError::TeleportationUnavailable(self.layout.id(task).to_string()))
    }

    /// Pop the top of `from`'s pending stack if `accept` takes it.
    fn take_pending(&mut self, from: usize, accept: impl Fn(&Pending) -> bool) -> Option<Pending> {
        let stack = self.ctx.pending.get_mut(&from)?;
        if stack.last().is_some_and(accept) {
            stack.pop()
        } else {
            None
        }
    }

    fn push_pending(&mut self, task: usize, pending: Pending) {
        self.ctx.pending.entry(task).or_default().push(pending);
    }

    /// Entangle `link` and `remote` into a Bell pair.
    fn share_pair(&mut self, comm: CommQubits) -> ExecResult<()> {
        self.engine.apply_gate(&Gate::H, &[comm.link])?;
        self.engine.apply_gate(&Gate::CX, &[comm.link, comm.remote])?;
        Ok(())
    }

    /// Apply `gate` to `qubit` when `bit` is set.
    fn correct(&mut self, bit: bool, gate: Gate, qubit: usize) -> ExecResult<()> {
        if bit {
            self.engine.apply_gate(&gate, &[qubit])?;
        }
        Ok(())
    }

    /// Teleport the target to the partner.
    ///
    /// Bell-measures the target against `link`, pushes both outcomes for the
    /// partner and returns the target and `link` to |0⟩.
    pub(crate) fn qsend(&mut self, task: usize, inst: &Instruction) -> ExecResult<Flow> {
        let comm = self.comm(task)?;
        let partner = self.partner(task, inst)?;
        let qubit = self.target(task, inst)?;
        if self.ctx.comm_busy {
            return Ok(Flow::Block(BlockReason::CommBusy));
        }

        self.share_pair(comm)?;
        self.engine.apply_gate(&Gate::CX, &[qubit, comm.link])?;
        self.engine.apply_gate(&Gate::H, &[qubit])?;
        let source = self.engine.measure(qubit)?;
        let link = self.engine.measure(comm.link)?;
        self.correct(source, Gate::X, qubit)?;
        self.correct(link, Gate::X, comm.link)?;

        self.push_pending(task, Pending::Teleport { source, link });
        self.ctx.comm_busy = true;
        self.unblock(partner);
        debug!(
            from = self.layout.id(task),
            to = self.layout.id(partner),
            source,
            link,
            "Qubit sent"
        );
        Ok(Flow::Advance)
    }

    /// Receive a teleported qubit into the target.
    ///
    /// Blocks until the partner's `qsend` outcomes are pending. Corrects
    /// `remote`, swaps it into the target and returns `remote` to |0⟩.
    pub(crate) fn qrecv(&mut self, task: usize, inst: &Instruction) -> ExecResult<Flow> {
        let comm = self.comm(task)?;
        let partner = self.partner(task, inst)?;
        let qubit = self.target(task, inst)?;
        let Some(Pending::Teleport { source, link }) =
            self.take_pending(partner, |p| matches!(p, Pending::Teleport { .. }))
        else {
            return Ok(Flow::Block(BlockReason::Partner));
        };

        self.correct(link, Gate::X, comm.remote)?;
        self.correct(source, Gate::Z, comm.remote)?;
        self.engine.apply_gate(&Gate::Swap, &[comm.remote, qubit])?;
        let leftover = self.engine.measure(comm.remote)?;
        self.correct(leftover, Gate::X, comm.remote)?;

        self.release_comm();
        debug!(
            from = self.layout.id(partner),
            to = self.layout.id(task),
            "Qubit received"
        );
        Ok(Flow::Advance)
    }

    /// Lend the target as a control to the partner's `rcontrol`.
    ///
    /// First visit: cat-entangle the target with `remote`, push the `link`
    /// outcome and park until the partner is done. Second visit: apply the
    /// partner's disentangling correction to the target and move on.
    pub(crate) fn expose(&mut self, task: usize, inst: &Instruction) -> ExecResult<Flow> {
        let comm = self.comm(task)?;
        let partner = self.partner(task, inst)?;
        let qubit = self.target(task, inst)?;

        if self.states[task].cat_entangled {
            let Some(Pending::Disentangled(bit)) =
                self.take_pending(partner, |p| matches!(p, Pending::Disentangled(_)))
            else {
                return Ok(Flow::Block(BlockReason::Partner));
            };
            self.correct(bit, Gate::Z, qubit)?;
            self.states[task].cat_entangled = false;
            self.release_comm();
            debug!(task = self.layout.id(task), "Exposed qubit released");
            return Ok(Flow::Advance);
        }

        if self.ctx.comm_busy {
            return Ok(Flow::Block(BlockReason::CommBusy));
        }
        self.share_pair(comm)?;
        self.engine.apply_gate(&Gate::CX, &[qubit, comm.link])?;
        let link = self.engine.measure(comm.link)?;
        self.correct(link, Gate::X, comm.link)?;

        self.push_pending(task, Pending::Exposed(link));
        self.ctx.comm_busy = true;
        self.states[task].cat_entangled = true;
        self.states[task].blocked = Some(BlockReason::Partner);
        self.unblock(partner);
        debug!(
            from = self.layout.id(task),
            to = self.layout.id(partner),
            link,
            "Qubit exposed"
        );
        Ok(Flow::Stay)
    }

    /// Apply `body` with operand `-1` bound to the partner's exposed qubit.
    ///
    /// Blocks until the partner's `expose` outcome is pending, then finishes
    /// the cat state on `remote`, runs the body, measures `remote` in the X
    /// basis and pushes the outcome back to the partner.
    pub(crate) fn rcontrol(
        &mut self,
        task: usize,
        inst: &Instruction,
        body: &[Instruction],
    ) -> ExecResult<Flow> {
        let comm = self.comm(task)?;
        let partner = self.partner(task, inst)?;
        let Some(Pending::Exposed(link)) =
            self.take_pending(partner, |p| matches!(p, Pending::Exposed(_)))
        else {
            return Ok(Flow::Block(BlockReason::Partner));
        };

        self.correct(link, Gate::X, comm.remote)?;
        for nested in body {
            if !self.condition_holds(nested) {
                continue;
            }
            match &nested.op {
                Operation::Gate(gate) => self.apply_gate(task, nested, gate)?,
                Operation::Barrier => {}
                _ => return Err(ExecError::InvalidNested(nested.name.clone())),
            }
        }
        self.engine.apply_gate(&Gate::H, &[comm.remote])?;
        let bit = self.engine.measure(comm.remote)?;
        self.correct(bit, Gate::X, comm.remote)?;

        self.push_pending(task, Pending::Disentangled(bit));
        self.unblock(partner);
        debug!(
            task = self.layout.id(task),
            control = self.layout.id(partner),
            gates = body.len(),
            "Remote-controlled body applied"
        );
        Ok(Flow::Advance)
    }
}

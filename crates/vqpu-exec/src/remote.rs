//! Conditional gates across process boundaries.
//!
//! `measure_and_send` ships one measurement bit to a peer endpoint; `recv`
//! blocks on the classical channel until that bit arrives and stores it in a
//! remote conditional register. Gates guarded by that register then follow
//! the ordinary skip rule.
//!
//! Unlike the in-process hand-offs, `recv` suspends the whole worker until the
//! peer sends, so each side must run its own scheduler concurrently.

use tracing::debug;
use vqpu_comm::{ClassicalChannel, Endpoint};
use vqpu_hal::SimulationEngine;
use vqpu_ir::Instruction;

use crate::error::{ExecError, ExecResult};
use crate::scheduler::Shot;
use crate::state::Flow;

impl<'a, E: SimulationEngine + ?Sized> Shot<'a, E> {
    fn require_channel(&self, inst: &Instruction) -> ExecResult<&'a dyn ClassicalChannel> {
        self.channel
            .ok_or_else(|| ExecError::MissingChannel(inst.name.clone()))
    }

    /// Measure the target and send the outcome to the peer.
    ///
    /// The outcome is also recorded locally when the instruction names a
    /// clbit or register.
    pub(crate) async fn measure_and_send(
        &mut self,
        task: usize,
        inst: &Instruction,
    ) -> ExecResult<Flow> {
        let channel = self.require_channel(inst)?;
        let peer = Endpoint::new(self.peer(task, inst)?);
        let qubit = self.target(task, inst)?;

        let bit = self.engine.measure(qubit)?;
        if !inst.clbits.is_empty() || inst.clreg.is_some() {
            self.record(task, inst, None, bit)?;
        }
        channel.send_measure(bit, &peer).await?;
        debug!(task = self.layout.id(task), %peer, bit, "Measurement sent");
        Ok(Flow::Advance)
    }

    /// Wait for the peer's bit and store it in remote register `register`.
    pub(crate) async fn recv(
        &mut self,
        task: usize,
        inst: &Instruction,
        register: usize,
    ) -> ExecResult<Flow> {
        let channel = self.require_channel(inst)?;
        let peer = Endpoint::new(self.peer(task, inst)?);

        let bit = channel.recv_measure(&peer).await?;
        self.ctx.remote_regs.insert(register, bit);
        debug!(task = self.layout.id(task), %peer, register, bit, "Measurement received");
        Ok(Flow::Advance)
    }
}

//! The VF end of the PF/VF mailbox.
//!
//! The mailbox is a 16-word buffer (VFMBMEM) shared with the PF plus the VFMAILBOX
//! control register. Only one side may own the buffer at a time: the VF takes it by
//! setting VFU, and hands it over by setting REQ (a message for the PF) or ACK
//! (we consumed the PF's message). The PF signals back through PFSTS (message waiting),
//! PFACK (our message was consumed) and RSTI/RSTD (the PF is resetting us).
//!
//! Reading VFMAILBOX clears PFSTS, PFACK and RSTD, so every read is merged into
//! a software shadow and each indication is consumed from there exactly once.

use bitflags::bitflags;

use crate::config::{Delay, RetryPolicy};
use crate::error::{VfError, VfResult};
use crate::msg::MailboxMessage;
use crate::regs::*;

bitflags! {
    /// Bits of the VFMAILBOX register.
    pub struct VfMailboxFlags: u32 {
        /// Request for PF ready bit
        const REQ   = 0x0000_0001;
        /// Ack PF message received
        const ACK   = 0x0000_0002;
        /// VF owns the mailbox buffer
        const VFU   = 0x0000_0004;
        /// PF owns the mailbox buffer
        const PFU   = 0x0000_0008;
        /// PF wrote a message in the MB
        const PFSTS = 0x0000_0010;
        /// PF ack the previous VF msg
        const PFACK = 0x0000_0020;
        /// PF has reset indication
        const RSTI  = 0x0000_0040;
        /// PF has indicated reset done
        const RSTD  = 0x0000_0080;
        /// Bits that are cleared by reading the register.
        const R2C_BITS = Self::RSTD.bits | Self::PFSTS.bits | Self::PFACK.bits;
    }
}

/// Counters kept by the transport.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MailboxStats {
    /// Messages written to the PF.
    pub msgs_tx: u32,
    /// Messages read from the PF.
    pub msgs_rx: u32,
    /// PF acknowledgements observed.
    pub acks: u32,
    /// PF messages observed.
    pub reqs: u32,
    /// PF reset indications observed.
    pub rsts: u32,
}

/// Transport state of the mailbox.
///
/// The register window itself is owned by the caller and passed into every operation,
/// so that the hardware handle can keep both side by side.
#[derive(Debug)]
pub struct VfMailbox {
    /// Read-to-clear bits seen but not yet consumed.
    v2p_mailbox: u32,
    /// Retry policy of the posted operations. `None` until a reset arms it.
    timeout: Option<RetryPolicy>,
    stats: MailboxStats,
}

impl Default for VfMailbox {
    fn default() -> VfMailbox {
        VfMailbox::new()
    }
}

impl VfMailbox {
    /// A mailbox that is not yet armed: posted operations fail until [`VfMailbox::arm()`].
    pub const fn new() -> VfMailbox {
        VfMailbox {
            v2p_mailbox: 0,
            timeout: None,
            stats: MailboxStats { msgs_tx: 0, msgs_rx: 0, acks: 0, reqs: 0, rsts: 0 },
        }
    }

    pub fn arm(&mut self, policy: RetryPolicy) {
        self.timeout = Some(policy);
    }

    pub fn disarm(&mut self) {
        self.timeout = None;
    }

    pub fn timeout(&self) -> Option<RetryPolicy> {
        self.timeout
    }

    pub fn stats(&self) -> &MailboxStats {
        &self.stats
    }

    /// Reads VFMAILBOX, merging in indications consumed by earlier reads.
    fn read_v2p<R: RegisterAccess>(&mut self, regs: &mut VfRegisters<R>) -> u32 {
        let v2p_mailbox = regs.read(IXGBE_VFMAILBOX) | self.v2p_mailbox;
        self.v2p_mailbox |= v2p_mailbox & VfMailboxFlags::R2C_BITS.bits();
        v2p_mailbox
    }

    /// Tests and consumes the indications in `mask`.
    fn check_for_bit<R: RegisterAccess>(&mut self, regs: &mut VfRegisters<R>, mask: VfMailboxFlags) -> bool {
        let v2p_mailbox = self.read_v2p(regs);
        self.v2p_mailbox &= !mask.bits();
        v2p_mailbox & mask.bits() != 0
    }

    /// Whether the PF has posted a message for us.
    pub fn check_for_msg<R: RegisterAccess>(&mut self, regs: &mut VfRegisters<R>) -> bool {
        if self.check_for_bit(regs, VfMailboxFlags::PFSTS) {
            self.stats.reqs += 1;
            true
        } else {
            false
        }
    }

    /// Whether the PF has acknowledged our last message.
    pub fn check_for_ack<R: RegisterAccess>(&mut self, regs: &mut VfRegisters<R>) -> bool {
        if self.check_for_bit(regs, VfMailboxFlags::PFACK) {
            self.stats.acks += 1;
            true
        } else {
            false
        }
    }

    /// Whether the PF is resetting us or has just finished doing so.
    pub fn check_for_rst<R: RegisterAccess>(&mut self, regs: &mut VfRegisters<R>) -> bool {
        if self.check_for_bit(regs, VfMailboxFlags::RSTD | VfMailboxFlags::RSTI) {
            self.stats.rsts += 1;
            true
        } else {
            false
        }
    }

    /// Takes ownership of the mailbox buffer.
    fn obtain_lock<R: RegisterAccess>(&mut self, regs: &mut VfRegisters<R>) -> VfResult<()> {
        regs.write(IXGBE_VFMAILBOX, VfMailboxFlags::VFU.bits());
        if self.read_v2p(regs) & VfMailboxFlags::VFU.bits() != 0 {
            Ok(())
        } else {
            debug!("ixgbevf: failed to obtain the mailbox lock");
            Err(VfError::MailboxBusy)
        }
    }

    /// Copies `msg` into the mailbox and signals the PF, without waiting.
    pub fn write<R: RegisterAccess>(&mut self, regs: &mut VfRegisters<R>, msg: &MailboxMessage) -> VfResult<()> {
        if regs.is_removed() {
            return Err(VfError::DeviceRemoved);
        }
        self.obtain_lock(regs)?;

        // drop any indication left over from an earlier exchange
        self.check_for_msg(regs);
        self.check_for_ack(regs);

        for (i, word) in msg.words().iter().enumerate() {
            regs.write(ixgbe_vfmbmem(i as u32), *word);
        }
        self.stats.msgs_tx += 1;

        regs.write(IXGBE_VFMAILBOX, VfMailboxFlags::REQ.bits());
        Ok(())
    }

    /// Copies `len` words out of the mailbox and acknowledges them, without waiting.
    pub fn read<R: RegisterAccess>(&mut self, regs: &mut VfRegisters<R>, len: usize) -> VfResult<MailboxMessage> {
        if regs.is_removed() {
            return Err(VfError::DeviceRemoved);
        }
        self.obtain_lock(regs)?;

        let mut msg = MailboxMessage::new(len);
        for i in 0..msg.len() {
            let word = regs.read(ixgbe_vfmbmem(i as u32));
            msg.set_word(i, word);
        }

        regs.write(IXGBE_VFMAILBOX, VfMailboxFlags::ACK.bits());
        self.stats.msgs_rx += 1;
        Ok(msg)
    }

    /// Polls `check` under the armed policy. On failure the mailbox is disarmed,
    /// so later posted operations fail fast until the next reset.
    fn poll<R, D, F>(&mut self, regs: &mut VfRegisters<R>, delay: &mut D, mut check: F) -> VfResult<()>
    where
        R: RegisterAccess,
        D: Delay,
        F: FnMut(&mut VfMailbox, &mut VfRegisters<R>) -> bool,
    {
        let policy = self.timeout.ok_or(VfError::TransportTimeout)?;
        if policy.poll(delay, || check(&mut *self, &mut *regs)) {
            return Ok(());
        }

        self.disarm();
        if regs.is_removed() {
            error!("ixgbevf: device removed while waiting on the mailbox");
            Err(VfError::DeviceRemoved)
        } else {
            error!("ixgbevf: mailbox timed out after {} us", policy.total_budget_us());
            Err(VfError::TransportTimeout)
        }
    }

    /// Writes `msg` and waits for the PF to acknowledge it.
    pub fn write_posted<R: RegisterAccess, D: Delay>(
        &mut self,
        regs: &mut VfRegisters<R>,
        delay: &mut D,
        msg: &MailboxMessage,
    ) -> VfResult<()> {
        if self.timeout.is_none() {
            return Err(VfError::TransportTimeout);
        }
        trace!("ixgbevf: mailbox write {:?}", msg);
        self.write(regs, msg)?;
        self.poll(regs, delay, |mbx, regs| mbx.check_for_ack(regs))
    }

    /// Waits for a message from the PF and reads `len` words of it.
    pub fn read_posted<R: RegisterAccess, D: Delay>(
        &mut self,
        regs: &mut VfRegisters<R>,
        delay: &mut D,
        len: usize,
    ) -> VfResult<MailboxMessage> {
        if self.timeout.is_none() {
            return Err(VfError::TransportTimeout);
        }
        self.poll(regs, delay, |mbx, regs| mbx.check_for_msg(regs))?;
        let msg = self.read(regs, len)?;
        trace!("ixgbevf: mailbox read {:?}", msg);
        Ok(msg)
    }

    /// One full request/reply exchange: writes `msg`, then reads a reply of `reply_len` words.
    pub fn write_msg_read_ack<R: RegisterAccess, D: Delay>(
        &mut self,
        regs: &mut VfRegisters<R>,
        delay: &mut D,
        msg: &MailboxMessage,
        reply_len: usize,
    ) -> VfResult<MailboxMessage> {
        self.write_posted(regs, delay, msg)?;
        self.read_posted(regs, delay, reply_len)
    }
}

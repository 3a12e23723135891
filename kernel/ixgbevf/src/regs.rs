//! Register offsets of the VF's private register window and the access layer on top of it.
//!
//! A VF sees a 16 KiB BAR with a small subset of the 82599 register file:
//! control and status, the interrupt registers, the mailbox, its own queue registers
//! and, on X550, the RSS registers. The offsets below are fixed by the hardware.
//!
//! All driver code goes through [`VfRegisters`], which wraps any [`RegisterAccess`] backend,
//! flushes posted writes by reading VFSTATUS, and latches the "device removed" state
//! the first time the window reads back as all ones.

use core::ptr::NonNull;
use volatile::Volatile;

/// Device Control Register
pub const IXGBE_VFCTRL:                 u32 = 0x00000;
/// Device Status Register
pub const IXGBE_VFSTATUS:               u32 = 0x00008;
/// Link Status Register
pub const IXGBE_VFLINKS:                u32 = 0x00010;
/// Free Running Timer
pub const IXGBE_VFFRTIMER:              u32 = 0x00048;
/// Extended Interrupt Cause Register
pub const IXGBE_VTEICR:                 u32 = 0x00100;
/// Extended Interrupt Cause Set Register
pub const IXGBE_VTEICS:                 u32 = 0x00104;
/// Extended Interrupt Mask Set/Read Register
pub const IXGBE_VTEIMS:                 u32 = 0x00108;
/// Extended Interrupt Mask Clear Register
pub const IXGBE_VTEIMC:                 u32 = 0x0010C;
/// Extended Interrupt Auto Clear Register
pub const IXGBE_VTEIAC:                 u32 = 0x00110;
/// Extended Interrupt Auto Mask Enable Register
pub const IXGBE_VTEIAM:                 u32 = 0x00114;
/// Mailbox Memory, [`IXGBE_VFMAILBOX_SIZE`](crate::config::IXGBE_VFMAILBOX_SIZE) words
pub const IXGBE_VFMBMEM:                u32 = 0x00200;
/// VF Mailbox control/status register
pub const IXGBE_VFMAILBOX:              u32 = 0x002FC;
/// Multiple Receive Queues Command Register (X550 only)
pub const IXGBE_VFMRQC:                 u32 = 0x03000;

/// Receive Descriptor Base Address Low of queue `n`
pub const fn ixgbe_vfrdbal(n: u32) -> u32 { 0x01000 + 0x40 * n }
/// Receive Descriptor Base Address High of queue `n`
pub const fn ixgbe_vfrdbah(n: u32) -> u32 { 0x01004 + 0x40 * n }
/// Receive Descriptor Length of queue `n`
pub const fn ixgbe_vfrdlen(n: u32) -> u32 { 0x01008 + 0x40 * n }
/// Receive Descriptor Head of queue `n`
pub const fn ixgbe_vfrdh(n: u32) -> u32 { 0x01010 + 0x40 * n }
/// Split Receive Control of queue `n`
pub const fn ixgbe_vfsrrctl(n: u32) -> u32 { 0x01014 + 0x40 * n }
/// Receive Descriptor Tail of queue `n`
pub const fn ixgbe_vfrdt(n: u32) -> u32 { 0x01018 + 0x40 * n }
/// Receive Descriptor Control of queue `n`
pub const fn ixgbe_vfrxdctl(n: u32) -> u32 { 0x01028 + 0x40 * n }
/// Transmit Descriptor Base Address Low of queue `n`
pub const fn ixgbe_vftdbal(n: u32) -> u32 { 0x02000 + 0x40 * n }
/// Transmit Descriptor Base Address High of queue `n`
pub const fn ixgbe_vftdbah(n: u32) -> u32 { 0x02004 + 0x40 * n }
/// Transmit Descriptor Length of queue `n`
pub const fn ixgbe_vftdlen(n: u32) -> u32 { 0x02008 + 0x40 * n }
/// Transmit Descriptor Head of queue `n`
pub const fn ixgbe_vftdh(n: u32) -> u32 { 0x02010 + 0x40 * n }
/// Transmit Descriptor Tail of queue `n`
pub const fn ixgbe_vftdt(n: u32) -> u32 { 0x02018 + 0x40 * n }
/// Transmit Descriptor Control of queue `n`
pub const fn ixgbe_vftxdctl(n: u32) -> u32 { 0x02028 + 0x40 * n }
/// Word `n` of the mailbox memory
pub const fn ixgbe_vfmbmem(n: u32) -> u32 { IXGBE_VFMBMEM + 4 * n }
/// RSS Random Key register `n` (X550 only)
pub const fn ixgbe_vfrssrk(n: u32) -> u32 { 0x03100 + 4 * n }
/// Redirection Table register `n`, 4 entries each (X550 only)
pub const fn ixgbe_vfreta(n: u32) -> u32 { 0x03200 + 4 * n }

/// Size of the VF register window.
pub const IXGBE_VF_BAR_SIZE:            usize = 0x4000;

/// Value returned by reads of a device that is no longer there.
pub const IXGBE_FAILED_READ_REG:        u32 = 0xFFFF_FFFF;

/// VFCTRL: function level reset
pub const IXGBE_CTRL_RST:               u32 = 0x0400_0000;
/// TXDCTL: transmit software flush
pub const IXGBE_TXDCTL_SWFLSH:          u32 = 0x0400_0000;
/// RXDCTL: receive queue enable
pub const IXGBE_RXDCTL_ENABLE:          u32 = 0x0200_0000;
/// RXDCTL: largest receive frame, used when RLPML_EN is set
pub const IXGBE_RXDCTL_RLPMLMASK:       u32 = 0x0000_3FFF;
/// RXDCTL: enable the per-queue frame size limit
pub const IXGBE_RXDCTL_RLPML_EN:        u32 = 0x0000_8000;
/// All three VF interrupt causes
pub const IXGBE_VF_IRQ_CLEAR_MASK:      u32 = 7;

/// VFLINKS: link up
pub const IXGBE_LINKS_UP:               u32 = 0x4000_0000;
/// VFLINKS: 2-bit speed field, also the 10G pattern
pub const IXGBE_LINKS_SPEED_82599:      u32 = 0x3000_0000;
pub const IXGBE_LINKS_SPEED_10G_82599:  u32 = 0x3000_0000;
pub const IXGBE_LINKS_SPEED_1G_82599:   u32 = 0x2000_0000;
pub const IXGBE_LINKS_SPEED_100_82599:  u32 = 0x1000_0000;
/// VFLINKS speed pattern that means 10 Mb/s on X550EM_a and is reserved before
pub const IXGBE_LINKS_SPEED_10_X550EM_A: u32 = 0x0000_0000;
/// VFLINKS: non-standard speed modifier on X550
pub const IXGBE_LINKS_SPEED_NON_STD:    u32 = 0x0800_0000;

/// VFMRQC: RSS enable
pub const IXGBE_VFMRQC_RSSEN:           u32 = 0x0000_0001;
pub const IXGBE_MRQC_RSS_FIELD_IPV4_TCP: u32 = 0x0001_0000;
pub const IXGBE_MRQC_RSS_FIELD_IPV4:    u32 = 0x0002_0000;
pub const IXGBE_MRQC_RSS_FIELD_IPV6:    u32 = 0x0010_0000;
pub const IXGBE_MRQC_RSS_FIELD_IPV6_TCP: u32 = 0x0020_0000;


/// Raw 32-bit access to the VF register window, by byte offset.
///
/// Implemented by [`MmioRegisters`] for real hardware.
pub trait RegisterAccess {
    fn read32(&mut self, offset: u32) -> u32;
    fn write32(&mut self, offset: u32, value: u32);
}

/// The VF's BAR0 mapped into our address space.
pub struct MmioRegisters {
    base: NonNull<Volatile<u32>>,
    num_words: usize,
}

// The mapping belongs to this object alone.
unsafe impl Send for MmioRegisters {}

impl MmioRegisters {
    /// Wraps an already mapped register window.
    /// Returns `None` if `base` is null or not 4-byte aligned.
    ///
    /// # Safety
    /// `base` must point to `size_in_bytes` of uncached, device-backed memory
    /// that stays mapped and is accessed only through the returned object.
    pub unsafe fn new(base: *mut u32, size_in_bytes: usize) -> Option<MmioRegisters> {
        if base as usize % core::mem::align_of::<u32>() != 0 {
            return None;
        }
        let base = NonNull::new(base as *mut Volatile<u32>)?;
        Some(MmioRegisters { base, num_words: size_in_bytes / 4 })
    }

    fn register(&mut self, offset: u32) -> Option<&mut Volatile<u32>> {
        let index = (offset / 4) as usize;
        if offset % 4 != 0 || index >= self.num_words {
            error!("ixgbevf: register offset {:#X} is outside the VF window", offset);
            return None;
        }
        // SAFETY: the index is within the window handed to `new()`, whose caller vouched for it.
        Some(unsafe { &mut *self.base.as_ptr().add(index) })
    }
}

impl RegisterAccess for MmioRegisters {
    fn read32(&mut self, offset: u32) -> u32 {
        self.register(offset).map_or(IXGBE_FAILED_READ_REG, |reg| reg.read())
    }

    fn write32(&mut self, offset: u32, value: u32) {
        if let Some(reg) = self.register(offset) {
            reg.write(value);
        }
    }
}


/// The register window as seen by the rest of the driver.
pub struct VfRegisters<R> {
    io: R,
    removed: bool,
}

impl<R: RegisterAccess> VfRegisters<R> {
    pub fn new(io: R) -> VfRegisters<R> {
        VfRegisters { io, removed: false }
    }

    /// Whether the device has been found missing. Once set this never clears.
    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Reads a register. A removed device reads as [`IXGBE_FAILED_READ_REG`] without being touched.
    pub fn read(&mut self, reg: u32) -> u32 {
        if self.removed {
            return IXGBE_FAILED_READ_REG;
        }
        let value = self.io.read32(reg);
        if value == IXGBE_FAILED_READ_REG {
            self.check_remove(reg);
        }
        value
    }

    /// Writes a register, unless the device is gone.
    pub fn write(&mut self, reg: u32, value: u32) {
        if self.removed {
            return;
        }
        self.io.write32(reg, value);
    }

    /// Forces earlier posted writes out to the device.
    pub fn write_flush(&mut self) {
        let _ = self.read(IXGBE_VFSTATUS);
    }

    /// An all-ones read may be a legitimate value, so confirm it against VFSTATUS,
    /// which never reads as all ones on a present device.
    fn check_remove(&mut self, reg: u32) {
        if reg == IXGBE_VFSTATUS || self.io.read32(IXGBE_VFSTATUS) == IXGBE_FAILED_READ_REG {
            error!("ixgbevf: adapter removed");
            self.removed = true;
        }
    }

    pub fn io(&self) -> &R {
        &self.io
    }

    pub fn io_mut(&mut self) -> &mut R {
        &mut self.io
    }
}

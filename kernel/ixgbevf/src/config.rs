//! Protocol constants and the timing configuration of the VF driver.
//!
//! Every polling loop in this crate is driven by a [`RetryPolicy`] taken from a [`VfConfig`],
//! and every wait goes through the platform's [`Delay`] implementation,
//! so the hardware defaults below can be shortened or replaced by a fake clock.

/// Number of 32-bit words in the shared mailbox memory (VFMBMEM).
pub const IXGBE_VFMAILBOX_SIZE: usize = 16;
/// Length of an Ethernet MAC address in bytes.
pub const IXGBE_ETH_LENGTH_OF_ADDRESS: usize = 6;

/// Upper bound on the number of Tx queues a PF may hand to one VF.
pub const IXGBE_VF_MAX_TX_QUEUES: u32 = 8;
/// Upper bound on the number of Rx queues a PF may hand to one VF.
pub const IXGBE_VF_MAX_RX_QUEUES: u32 = 8;

/// Number of retries while waiting for the reset indication to clear.
pub const IXGBE_VF_INIT_TIMEOUT: u32 = 200;
/// Microseconds between two reads of the reset indication.
pub const IXGBE_VF_RESET_POLL_DELAY_US: u32 = 5;
/// Number of retries on the mailbox once it is armed by a reset.
pub const IXGBE_VF_MBX_INIT_TIMEOUT: u32 = 2000;
/// Microseconds between mailbox retries.
pub const IXGBE_VF_MBX_INIT_DELAY: u32 = 500;
/// Time the function level reset needs before the reset bits are meaningful.
pub const IXGBE_VF_RESET_SETTLE_MS: u32 = 50;
/// Time the PF needs to prepare the permanent address after a reset request.
pub const IXGBE_VF_RESET_REPLY_DELAY_MS: u32 = 10;
/// Time for queue disables to take effect in `stop_adapter`.
pub const IXGBE_VF_STOP_SETTLE_MS: u32 = 2;

/// Size of the RSS hash key in bytes.
pub const IXGBEVF_RSS_HASH_KEY_SIZE: usize = 40;
/// Number of RSS hash key registers (VFRSSRK).
pub const IXGBEVF_VFRSSRK_REGS: usize = IXGBEVF_RSS_HASH_KEY_SIZE / 4;
/// Entries in the 82599/X540 redirection table, reported by the PF.
pub const IXGBEVF_82599_RETA_SIZE: usize = 128;
/// Entries in the X550 VF redirection table, programmed by the VF.
pub const IXGBEVF_X550_VFRETA_SIZE: usize = 64;

/// The source of time for every wait performed by the driver.
///
/// On hardware this is a calibrated busy-wait plus the scheduler's sleep;
/// tests plug in a clock that only counts.
pub trait Delay {
    /// Busy-waits for `us` microseconds.
    fn udelay(&mut self, us: u32);
    /// Sleeps for `ms` milliseconds.
    fn msleep(&mut self, ms: u32);
}

/// A bounded polling loop: at most `max_attempts` checks, `delay_us` apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay_us: u32,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay_us: u32) -> RetryPolicy {
        RetryPolicy { max_attempts, delay_us }
    }

    /// The longest time a poll under this policy can spend waiting, in microseconds.
    pub const fn total_budget_us(&self) -> u64 {
        self.max_attempts.saturating_sub(1) as u64 * self.delay_us as u64
    }

    /// Calls `done` until it returns `true` or the attempts are used up.
    /// Waits `delay_us` between two calls, never after the last one.
    ///
    /// Returns `true` if `done` succeeded within the budget.
    pub fn poll<D: Delay, F: FnMut() -> bool>(&self, delay: &mut D, mut done: F) -> bool {
        for attempt in 0..self.max_attempts {
            if done() {
                return true;
            }
            if attempt + 1 < self.max_attempts {
                delay.udelay(self.delay_us);
            }
        }
        false
    }
}

/// Timing parameters of one VF instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VfConfig {
    /// Sleep after setting VFCTRL.RST.
    pub reset_settle_ms: u32,
    /// Poll for the PF reset indication to clear.
    pub reset_poll: RetryPolicy,
    /// Mailbox policy armed by a reset.
    pub mbx_init: RetryPolicy,
    /// Sleep between posting the reset request and reading the reply.
    pub reset_reply_delay_ms: u32,
    /// Sleep after disabling the queues.
    pub stop_settle_ms: u32,
}

impl Default for VfConfig {
    fn default() -> VfConfig {
        VfConfig {
            reset_settle_ms: IXGBE_VF_RESET_SETTLE_MS,
            reset_poll: RetryPolicy::new(IXGBE_VF_INIT_TIMEOUT, IXGBE_VF_RESET_POLL_DELAY_US),
            mbx_init: RetryPolicy::new(IXGBE_VF_MBX_INIT_TIMEOUT, IXGBE_VF_MBX_INIT_DELAY),
            reset_reply_delay_ms: IXGBE_VF_RESET_REPLY_DELAY_MS,
            stop_settle_ms: IXGBE_VF_STOP_SETTLE_MS,
        }
    }
}

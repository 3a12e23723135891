//! Receive side scaling state of the VF.
//!
//! On 82599 and X540 the RSS key and redirection table belong to the PF and can only be
//! read through the mailbox. X550 VFs own VFRSSRK, VFRETA and VFMRQC and program them directly.

use alloc::vec::Vec;

use crate::config::*;
use crate::error::{VfError, VfResult};
use crate::hw::{MacType, VfHw};
use crate::msg::*;
use crate::regs::*;

impl<R: RegisterAccess, D: Delay> VfHw<R, D> {
    /// The PF only answers RSS queries from pre-X550 VFs, and not under every API version.
    fn rss_query_supported(&self) -> bool {
        self.mac_type < MacType::X550Vf && self.api_version.supports_rss_query()
    }

    /// Fetches the redirection table from the PF, masked for `num_rx_queues`.
    pub fn query_reta(&mut self, num_rx_queues: u16) -> VfResult<Vec<u8>> {
        if !self.rss_query_supported() {
            return Err(VfError::NotSupported);
        }
        let reply = self.exchange(Request::GetReta, IXGBE_VF_RETA_MSG_LEN)?;
        if reply.header().is(Opcode::GetReta, MsgType::FAILURE) {
            return Err(VfError::PermissionDenied);
        }
        reply.expect(Opcode::GetReta, MsgType::SUCCESS)?;

        self.reta = unpack_reta(&reply, num_rx_queues);
        Ok(self.reta.clone())
    }

    /// Fetches the RSS hash key from the PF.
    pub fn query_rss_key(&mut self) -> VfResult<[u8; IXGBEVF_RSS_HASH_KEY_SIZE]> {
        if !self.rss_query_supported() {
            return Err(VfError::NotSupported);
        }
        let reply = self.exchange(Request::GetRssKey, IXGBE_VF_RSS_KEY_MSG_LEN)?;
        if reply.header().is(Opcode::GetRssKey, MsgType::FAILURE) {
            return Err(VfError::PermissionDenied);
        }
        reply.expect(Opcode::GetRssKey, MsgType::SUCCESS)?;

        self.rss_key = rss_key_of(&reply);
        Ok(self.rss_key)
    }

    /// Programs the X550 RSS registers: the hash key, a redirection table spreading
    /// buckets round-robin over `num_rx_queues`, and the hashed packet types.
    pub fn configure_rss(&mut self, key: &[u8; IXGBEVF_RSS_HASH_KEY_SIZE], num_rx_queues: u16) -> VfResult<()> {
        if self.mac_type < MacType::X550Vf {
            return Err(VfError::NotSupported);
        }

        for (i, chunk) in key.chunks_exact(4).enumerate() {
            let rssrk = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
            self.regs.write(ixgbe_vfrssrk(i as u32), rssrk);
        }
        self.rss_key = *key;

        let rss_i = num_rx_queues.max(1) as u32;
        let mut reta = Vec::with_capacity(IXGBEVF_X550_VFRETA_SIZE);
        let mut vfreta = 0;
        for i in 0..IXGBEVF_X550_VFRETA_SIZE as u32 {
            let queue = i % rss_i;
            reta.push(queue as u8);
            vfreta |= queue << ((i & 0x3) * 8);
            if i & 0x3 == 0x3 {
                self.regs.write(ixgbe_vfreta(i >> 2), vfreta);
                vfreta = 0;
            }
        }
        self.reta = reta;

        let vfmrqc = IXGBE_MRQC_RSS_FIELD_IPV4
            | IXGBE_MRQC_RSS_FIELD_IPV4_TCP
            | IXGBE_MRQC_RSS_FIELD_IPV6
            | IXGBE_MRQC_RSS_FIELD_IPV6_TCP
            | IXGBE_VFMRQC_RSSEN;
        self.regs.write(IXGBE_VFMRQC, vfmrqc);

        debug!("ixgbevf: RSS enabled over {} queues", rss_i);
        Ok(())
    }

    /// The last RSS key fetched or programmed.
    pub fn rss_key(&self) -> [u8; IXGBEVF_RSS_HASH_KEY_SIZE] {
        self.rss_key
    }

    /// The last redirection table fetched or programmed, empty if there was none.
    pub fn reta(&self) -> &[u8] {
        &self.reta
    }
}

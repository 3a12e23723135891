//! The hardware handle of one VF, and every operation that goes through the PF.
//!
//! A VF comes up in two steps: [`VfHw::reset_hw()`] performs a function level reset,
//! waits for the PF to finish its side of it, and asks the PF for our permanent MAC address;
//! [`VfHw::init_hw()`] then makes that address the operational one.
//! Everything the VF can't do by itself (filters, MTU, API negotiation) is a single
//! request/reply exchange over the mailbox, which is armed by the reset.

use alloc::vec::Vec;

use crate::config::*;
use crate::error::{VfError, VfResult};
use crate::link::LinkStatus;
use crate::mailbox::{MailboxStats, VfMailbox};
use crate::msg::*;
use crate::regs::*;

/// The silicon generation behind the VF, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MacType {
    Vf82599,
    X540Vf,
    X550Vf,
    X550EmXVf,
    X550EmAVf,
}

/// Progress of the reset handshake with the PF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfState {
    /// No reset has been attempted yet.
    Stopped,
    /// The function level reset was issued and the PF has not released us yet.
    Resetting,
    /// The reset request was posted and we wait for the permanent address.
    AwaitingPermAddr,
    /// The PF handed out a permanent address.
    Ready,
    /// The last reset failed, so the permanent address can't be trusted.
    PermAddrInvalid,
}

/// All state of one VF instance.
pub struct VfHw<R, D> {
    pub(crate) regs: VfRegisters<R>,
    pub(crate) delay: D,
    pub(crate) config: VfConfig,
    pub(crate) mbx: VfMailbox,
    pub(crate) mac_type: MacType,
    pub(crate) state: VfState,
    pub(crate) adapter_stopped: bool,
    pub(crate) perm_addr: [u8; IXGBE_ETH_LENGTH_OF_ADDRESS],
    pub(crate) addr: [u8; IXGBE_ETH_LENGTH_OF_ADDRESS],
    pub(crate) mc_filter_type: u32,
    pub(crate) api_version: ApiVersion,
    pub(crate) queues: QueueConfig,
    pub(crate) rss_key: [u8; IXGBEVF_RSS_HASH_KEY_SIZE],
    pub(crate) reta: Vec<u8>,
    pub(crate) link: LinkStatus,
}

impl<R: RegisterAccess, D: Delay> VfHw<R, D> {
    pub fn new(io: R, delay: D, mac_type: MacType, config: VfConfig) -> VfHw<R, D> {
        VfHw {
            regs: VfRegisters::new(io),
            delay,
            config,
            mbx: VfMailbox::new(),
            mac_type,
            state: VfState::Stopped,
            adapter_stopped: true,
            perm_addr: [0; IXGBE_ETH_LENGTH_OF_ADDRESS],
            addr: [0; IXGBE_ETH_LENGTH_OF_ADDRESS],
            mc_filter_type: 0,
            api_version: ApiVersion::V1_0,
            queues: QueueConfig::default(),
            rss_key: [0; IXGBEVF_RSS_HASH_KEY_SIZE],
            reta: Vec::new(),
            link: LinkStatus::DOWN,
        }
    }

    /// Masks interrupts and disables every queue. Other code must not touch the
    /// hardware until [`VfHw::start_hw()`] is called.
    pub fn stop_adapter(&mut self) {
        self.adapter_stopped = true;

        self.regs.write(IXGBE_VTEIMC, IXGBE_VF_IRQ_CLEAR_MASK);
        // clear pending interrupts
        let _ = self.regs.read(IXGBE_VTEICR);

        for i in 0..self.queues.max_tx_queues {
            self.regs.write(ixgbe_vftxdctl(i), IXGBE_TXDCTL_SWFLSH);
        }
        for i in 0..self.queues.max_rx_queues {
            let rxdctl = self.regs.read(ixgbe_vfrxdctl(i)) & !IXGBE_RXDCTL_ENABLE;
            self.regs.write(ixgbe_vfrxdctl(i), rxdctl);
        }

        self.regs.write_flush();
        self.delay.msleep(self.config.stop_settle_ms);
    }

    /// Resets the VF and fetches the permanent MAC address and multicast filter type from the PF.
    ///
    /// On [`VfError::ResetTimeout`] the previous permanent address is kept.
    /// On any failure after that the handle stays usable, but its permanent address is stale.
    pub fn reset_hw(&mut self) -> VfResult<()> {
        self.stop_adapter();
        self.state = VfState::Resetting;
        // the PF forgets the negotiated API on every VF reset
        self.api_version = ApiVersion::V1_0;

        debug!("ixgbevf: issuing a function level reset to MAC");
        let ctrl = self.regs.read(IXGBE_VFCTRL) | IXGBE_CTRL_RST;
        self.regs.write(IXGBE_VFCTRL, ctrl);
        self.regs.write_flush();
        if self.regs.is_removed() {
            self.state = VfState::PermAddrInvalid;
            return Err(VfError::DeviceRemoved);
        }
        self.delay.msleep(self.config.reset_settle_ms);

        // we cannot reset while the RSTI / RSTD bits are asserted,
        // and a removed device asserts them forever
        let mbx = &mut self.mbx;
        let regs = &mut self.regs;
        let reset_done = self.config.reset_poll.poll(&mut self.delay, || {
            regs.is_removed() || !mbx.check_for_rst(regs)
        });
        if self.regs.is_removed() {
            self.state = VfState::PermAddrInvalid;
            return Err(VfError::DeviceRemoved);
        }
        if !reset_done {
            self.state = VfState::PermAddrInvalid;
            error!("ixgbevf: PF still asserts reset after {} us", self.config.reset_poll.total_budget_us());
            return Err(VfError::ResetTimeout);
        }

        self.mbx.arm(self.config.mbx_init);
        self.state = VfState::AwaitingPermAddr;

        match self.request_perm_addr() {
            Ok(reply) => {
                self.perm_addr = reply.perm_addr;
                self.mc_filter_type = reply.mc_filter_type;
                self.state = VfState::Ready;
                debug!("ixgbevf: permanent address {:X?}, MC filter type {}", self.perm_addr, self.mc_filter_type);
                Ok(())
            }
            Err(e) => {
                warn!("ixgbevf: PF did not provide a permanent MAC address: {}", e);
                self.state = VfState::PermAddrInvalid;
                Err(e)
            }
        }
    }

    fn request_perm_addr(&mut self) -> VfResult<PermAddrReply> {
        self.mbx.write_posted(&mut self.regs, &mut self.delay, &Request::Reset.encode())?;
        self.delay.msleep(self.config.reset_reply_delay_ms);
        let reply = self.mbx.read_posted(&mut self.regs, &mut self.delay, IXGBE_VF_PERMADDR_MSG_LEN)?;
        PermAddrReply::parse(&reply)
    }

    /// Clears the adapter-stopped flag; the hardware is not touched.
    pub fn start_hw(&mut self) {
        self.adapter_stopped = false;
    }

    /// Starts the adapter with the permanent MAC address as its operational address.
    pub fn init_hw(&mut self) {
        self.start_hw();
        self.addr = self.get_mac_addr();
    }

    /// The permanent MAC address as last reported by the PF.
    pub fn get_mac_addr(&self) -> [u8; IXGBE_ETH_LENGTH_OF_ADDRESS] {
        self.perm_addr
    }

    /// One request followed by a reply of `reply_len` words.
    pub(crate) fn exchange(&mut self, request: Request, reply_len: usize) -> VfResult<MailboxMessage> {
        let msg = request.encode();
        self.mbx.write_msg_read_ack(&mut self.regs, &mut self.delay, &msg, reply_len)
    }

    /// A request the PF acknowledges but doesn't answer.
    fn post(&mut self, request: Request) -> VfResult<()> {
        let msg = request.encode();
        self.mbx.write_posted(&mut self.regs, &mut self.delay, &msg)
    }

    /// Asks the PF to make `addr` our MAC address.
    ///
    /// If the PF refuses, the operational address falls back to the permanent one.
    pub fn set_rar(&mut self, addr: [u8; IXGBE_ETH_LENGTH_OF_ADDRESS]) -> VfResult<()> {
        let reply = self.exchange(Request::SetMacAddr(addr), 3)?;
        if reply.header().is(Opcode::SetMacAddr, MsgType::NACK) {
            warn!("ixgbevf: PF rejected MAC address {:X?}, using {:X?}", addr, self.perm_addr);
            self.addr = self.get_mac_addr();
            return Err(VfError::Nacked);
        }
        reply.expect(Opcode::SetMacAddr, MsgType::ACK)?;
        self.addr = addr;
        Ok(())
    }

    /// Manages the additional unicast filters of this VF.
    /// Index 0 clears all of them, higher indices add `addr`.
    pub fn set_uc_addr(&mut self, index: u8, addr: Option<[u8; IXGBE_ETH_LENGTH_OF_ADDRESS]>) -> VfResult<()> {
        let reply = self.exchange(Request::SetMacVlan { index, addr }, 3)?;
        if reply.header().is(Opcode::SetMacVlan, MsgType::NACK) {
            warn!("ixgbevf: PF has no unicast filter left for {:X?}", addr);
            return Err(VfError::OutOfResources);
        }
        reply.expect(Opcode::SetMacVlan, MsgType::ACK)
    }

    /// Replaces the multicast filter with `mc_addrs`. Only the first 30 fit in one message.
    pub fn update_mc_addr_list(&mut self, mc_addrs: &[[u8; IXGBE_ETH_LENGTH_OF_ADDRESS]]) -> VfResult<()> {
        let request = Request::set_multicast(self.mc_filter_type, mc_addrs);
        self.post(request)
    }

    /// Adds (`vlan_on`) or removes a VLAN filter.
    pub fn set_vfta(&mut self, vlan: u32, vlan_on: bool) -> VfResult<()> {
        self.post(Request::SetVlan { vlan, vlan_on })
    }

    /// Sets the largest frame the PF lets us receive.
    pub fn set_rlpml(&mut self, max_frame_size: u32) -> VfResult<()> {
        self.post(Request::SetLpe { max_frame_size })
    }

    /// Promiscuous mode needs API 1.3, the other modes 1.2.
    pub fn update_xcast_mode(&mut self, mode: XcastMode) -> VfResult<()> {
        if !self.api_version.supports_xcast_mode() {
            return Err(VfError::NotSupported);
        }
        if mode == XcastMode::Promisc && self.api_version == ApiVersion::V1_2 {
            return Err(VfError::NotSupported);
        }
        let reply = self.exchange(Request::UpdateXcastMode(mode), 2)?;
        if reply.header().is(Opcode::UpdateXcastMode, MsgType::NACK) {
            return Err(VfError::PermissionDenied);
        }
        reply.expect(Opcode::UpdateXcastMode, MsgType::ACK)
    }

    /// Proposes a single API version. The version is only adopted if the PF acknowledges it.
    pub fn negotiate_api_version(&mut self, api: ApiVersion) -> VfResult<()> {
        let reply = self.exchange(Request::ApiNegotiate(api), 3)?;
        if reply.header().is(Opcode::ApiNegotiate, MsgType::NACK) {
            return Err(VfError::Nacked);
        }
        reply.expect(Opcode::ApiNegotiate, MsgType::ACK)?;
        self.api_version = api;
        Ok(())
    }

    /// Negotiates the newest API version both sides speak.
    pub fn negotiate_api(&mut self) -> VfResult<ApiVersion> {
        self.negotiate_api_from(&ApiVersion::NEGOTIATION_ORDER)
    }

    /// Proposes each of `versions` in turn until the PF accepts one.
    /// Refusals move on to the next version; transport errors end the negotiation.
    pub fn negotiate_api_from(&mut self, versions: &[ApiVersion]) -> VfResult<ApiVersion> {
        let mut result = Err(VfError::Nacked);
        for &api in versions {
            match self.negotiate_api_version(api) {
                Ok(()) => {
                    info!("ixgbevf: negotiated mailbox API {:?}", api);
                    return Ok(api);
                }
                Err(e @ (VfError::Nacked | VfError::ProtocolMismatch { .. })) => {
                    debug!("ixgbevf: PF refused mailbox API {:?}: {}", api, e);
                    result = Err(e);
                }
                Err(e) => return Err(e),
            }
        }
        result
    }

    /// Fetches the queue layout from the PF. APIs before 1.1 can't ask,
    /// and get the single-queue default without any exchange.
    pub fn get_queues(&mut self) -> VfResult<QueueConfig> {
        if !self.api_version.supports_queue_query() {
            self.queues = QueueConfig::default();
            return Ok(self.queues);
        }
        let reply = self.exchange(Request::GetQueues, IXGBE_VF_GET_QUEUES_MSG_LEN)?;
        self.queues = QueueConfig::parse(&reply)?;
        debug!("ixgbevf: queue configuration {:?}", self.queues);
        Ok(self.queues)
    }

    pub fn mac_type(&self) -> MacType {
        self.mac_type
    }

    pub fn state(&self) -> VfState {
        self.state
    }

    pub fn is_adapter_stopped(&self) -> bool {
        self.adapter_stopped
    }

    pub fn perm_addr(&self) -> [u8; IXGBE_ETH_LENGTH_OF_ADDRESS] {
        self.perm_addr
    }

    /// The operational MAC address.
    pub fn mac_addr(&self) -> [u8; IXGBE_ETH_LENGTH_OF_ADDRESS] {
        self.addr
    }

    pub fn mc_filter_type(&self) -> u32 {
        self.mc_filter_type
    }

    pub fn api_version(&self) -> ApiVersion {
        self.api_version
    }

    pub fn queues(&self) -> QueueConfig {
        self.queues
    }

    /// The last link state read by `check_mac_link()`.
    pub fn link(&self) -> LinkStatus {
        self.link
    }

    pub fn mailbox_stats(&self) -> &MailboxStats {
        self.mbx.stats()
    }

    pub fn config(&self) -> &VfConfig {
        &self.config
    }

    pub fn is_removed(&self) -> bool {
        self.regs.is_removed()
    }

    pub fn registers(&self) -> &VfRegisters<R> {
        &self.regs
    }

    pub fn registers_mut(&mut self) -> &mut VfRegisters<R> {
        &mut self.regs
    }
}


#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use alloc::vec;
    use crate::fake_pf::{FakeClock, FakePf};

    pub(crate) fn new_hw(pf: FakePf, mac_type: MacType) -> VfHw<FakePf, FakeClock> {
        VfHw::new(pf, FakeClock::default(), mac_type, VfConfig::default())
    }

    pub(crate) fn ready_hw(pf: FakePf, mac_type: MacType) -> VfHw<FakePf, FakeClock> {
        let mut hw = new_hw(pf, mac_type);
        hw.reset_hw().unwrap();
        hw.init_hw();
        hw
    }

    fn pf(hw: &VfHw<FakePf, FakeClock>) -> &FakePf {
        hw.registers().io()
    }

    fn pf_mut(hw: &mut VfHw<FakePf, FakeClock>) -> &mut FakePf {
        hw.registers_mut().io_mut()
    }

    #[test]
    fn stop_adapter_disables_queues() {
        let mut fake = FakePf::new();
        fake.set_register(ixgbe_vfrxdctl(0), IXGBE_RXDCTL_ENABLE | 0x20);
        let mut hw = new_hw(fake, MacType::Vf82599);
        hw.start_hw();

        hw.stop_adapter();
        assert!(hw.is_adapter_stopped());
        assert_eq!(pf(&hw).register(IXGBE_VTEIMC), IXGBE_VF_IRQ_CLEAR_MASK);
        assert_eq!(pf(&hw).register(ixgbe_vftxdctl(0)), IXGBE_TXDCTL_SWFLSH);
        assert_eq!(pf(&hw).register(ixgbe_vfrxdctl(0)), 0x20);
        assert_eq!(hw.delay.elapsed_us, 2_000);

        hw.stop_adapter();
        assert_eq!(pf(&hw).register(ixgbe_vfrxdctl(0)), 0x20);
        assert!(hw.is_adapter_stopped());
    }

    #[test]
    fn reset_fetches_perm_addr() {
        let mut fake = FakePf::new();
        fake.mc_filter_type = 2;
        let perm_addr = fake.perm_addr;
        let mut hw = new_hw(fake, MacType::Vf82599);
        assert_eq!(hw.state(), VfState::Stopped);

        hw.reset_hw().unwrap();
        assert_eq!(hw.state(), VfState::Ready);
        assert_eq!(hw.perm_addr(), perm_addr);
        assert_eq!(hw.mc_filter_type(), 2);
        assert_eq!(pf(&hw).function_resets, 1);
        assert_eq!(pf(&hw).requests, [Request::Reset]);
        assert_eq!(hw.mbx.timeout(), Some(hw.config().mbx_init));
        // stop, FLR settle, three polls of the reset bits, reply delay
        assert_eq!(hw.delay.elapsed_us, 2_000 + 50_000 + 3 * 5 + 10_000);

        // the operational address only changes with init
        assert_eq!(hw.mac_addr(), [0; 6]);
        hw.init_hw();
        assert_eq!(hw.mac_addr(), perm_addr);
        assert!(!hw.is_adapter_stopped());
    }

    #[test]
    fn nacked_reset_invalidates_perm_addr() {
        let mut fake = FakePf::new();
        fake.nack_reset = true;
        let mut hw = new_hw(fake, MacType::Vf82599);

        assert_eq!(hw.reset_hw(), Err(VfError::InvalidMacAddress));
        assert_eq!(hw.state(), VfState::PermAddrInvalid);
        assert_eq!(hw.perm_addr(), [0; 6]);

        // still usable: a later reset can succeed
        pf_mut(&mut hw).nack_reset = false;
        hw.reset_hw().unwrap();
        assert_eq!(hw.state(), VfState::Ready);
    }

    #[test]
    fn reset_timeout_keeps_perm_addr() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        let perm_addr = hw.perm_addr();
        pf_mut(&mut hw).hold_reset = true;
        pf_mut(&mut hw).perm_addr = [0x02, 0, 0, 0, 0, 0x99];

        assert_eq!(hw.reset_hw(), Err(VfError::ResetTimeout));
        assert_eq!(hw.perm_addr(), perm_addr);
        assert_eq!(hw.state(), VfState::PermAddrInvalid);
        assert_eq!(pf(&hw).requests, [Request::Reset]);
    }

    #[test]
    fn reset_of_removed_device() {
        let mut hw = new_hw(FakePf::new(), MacType::Vf82599);
        pf_mut(&mut hw).remove_device();
        assert_eq!(hw.reset_hw(), Err(VfError::DeviceRemoved));
        assert!(hw.is_removed());
        assert_eq!(hw.state(), VfState::PermAddrInvalid);
        // only the stop settle time; no FLR settle and no reset polling
        assert_eq!(hw.delay.elapsed_us, 2_000);
        assert_eq!(hw.mailbox_stats().rsts, 0);
        assert_eq!(pf(&hw).function_resets, 0);
    }

    #[test]
    fn reset_without_reply() {
        let mut fake = FakePf::new();
        fake.no_reply = true;
        let mut hw = new_hw(fake, MacType::Vf82599);

        assert_eq!(hw.reset_hw(), Err(VfError::TransportTimeout));
        assert_eq!(hw.state(), VfState::PermAddrInvalid);
        assert_eq!(hw.mbx.timeout(), None);
        // everything after that fails fast until the next reset
        assert_eq!(hw.set_vfta(5, true), Err(VfError::TransportTimeout));
        assert_eq!(pf(&hw).requests.len(), 1);
    }

    #[test]
    fn mailbox_unusable_before_reset() {
        let mut hw = new_hw(FakePf::new(), MacType::Vf82599);
        assert_eq!(hw.set_rar([0x02, 1, 2, 3, 4, 5]), Err(VfError::TransportTimeout));
        assert_eq!(hw.negotiate_api(), Err(VfError::TransportTimeout));
        assert!(pf(&hw).requests.is_empty());
    }

    #[test]
    fn set_rar_updates_mac_addr() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        let addr = [0x02, 0xAA, 0xBB, 0xCC, 0xDD, 0xEE];
        hw.set_rar(addr).unwrap();
        assert_eq!(hw.mac_addr(), addr);
        assert_eq!(pf(&hw).mac_addr, Some(addr));
    }

    #[test]
    fn rejected_mac_reverts_to_perm_addr() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        hw.set_rar([0x02, 1, 1, 1, 1, 1]).unwrap();

        pf_mut(&mut hw).reject_mac = true;
        assert_eq!(hw.set_rar([0x02, 2, 2, 2, 2, 2]), Err(VfError::Nacked));
        assert_eq!(hw.mac_addr(), hw.perm_addr());
    }

    #[test]
    fn set_rar_timeout_keeps_mac_addr() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        pf_mut(&mut hw).silent = true;
        assert_eq!(hw.set_rar([0x02, 2, 2, 2, 2, 2]), Err(VfError::TransportTimeout));
        assert_eq!(hw.mac_addr(), hw.perm_addr());
    }

    #[test]
    fn mismatched_reply() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        let wrong = MessageHeader::new(Opcode::SetVlan).with_type(MsgType::ACK).0;
        pf_mut(&mut hw).reply_override = Some(MailboxMessage::from_words(&[wrong, 0, 0]));

        match hw.set_rar([0x02, 2, 2, 2, 2, 2]) {
            Err(VfError::ProtocolMismatch { expected, received }) => {
                assert_eq!(expected, 0x8000_0002);
                assert_eq!(received, wrong);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn unicast_filters() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        hw.set_uc_addr(1, Some([0x02, 0, 0, 0, 0, 1])).unwrap();
        hw.set_uc_addr(2, Some([0x02, 0, 0, 0, 0, 2])).unwrap();
        assert_eq!(hw.set_uc_addr(3, Some([0x02, 0, 0, 0, 0, 3])), Err(VfError::OutOfResources));
        assert_eq!(pf(&hw).macvlans.len(), 2);

        hw.set_uc_addr(0, None).unwrap();
        assert!(pf(&hw).macvlans.is_empty());
    }

    #[test]
    fn multicast_list_uses_pf_filter_type() {
        let mut fake = FakePf::new();
        fake.mc_filter_type = 3;
        let mut hw = ready_hw(fake, MacType::Vf82599);

        let addrs = [[0x01, 0x00, 0x5E, 0x00, 0x00, 0x01], [0x01, 0x00, 0x5E, 0x7F, 0xFF, 0xFA]];
        hw.update_mc_addr_list(&addrs).unwrap();
        assert_eq!(pf(&hw).mc_vectors, vec![0x100, 0xAFF]);

        let many: Vec<[u8; 6]> = (0..40u8).map(|i| [0x01, 0x00, 0x5E, 0x00, i, 0x00]).collect();
        hw.update_mc_addr_list(&many).unwrap();
        assert_eq!(pf(&hw).mc_vectors.len(), 30);
        assert_eq!(pf(&hw).mc_vectors[29], 29);
    }

    #[test]
    fn vlan_and_frame_size() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        hw.set_vfta(100, true).unwrap();
        hw.set_vfta(200, true).unwrap();
        hw.set_vfta(100, false).unwrap();
        assert_eq!(pf(&hw).vlans, vec![200]);

        hw.set_rlpml(9018).unwrap();
        assert_eq!(pf(&hw).max_frame_size, 9018);
    }

    #[test]
    fn negotiation_picks_newest_common_version() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        assert_eq!(hw.negotiate_api(), Ok(ApiVersion::V1_3));
        assert_eq!(hw.api_version(), ApiVersion::V1_3);
        assert_eq!(&pf(&hw).requests[1..], &[
            Request::ApiNegotiate(ApiVersion::V1_5),
            Request::ApiNegotiate(ApiVersion::V1_4),
            Request::ApiNegotiate(ApiVersion::V1_3),
        ]);

        // a reset drops back to the base version
        hw.reset_hw().unwrap();
        assert_eq!(hw.api_version(), ApiVersion::V1_0);
    }

    #[test]
    fn negotiation_without_common_version() {
        let mut fake = FakePf::new();
        fake.supported_apis.clear();
        let mut hw = ready_hw(fake, MacType::Vf82599);
        assert_eq!(hw.negotiate_api(), Err(VfError::Nacked));
        assert_eq!(hw.api_version(), ApiVersion::V1_0);
        assert_eq!(pf(&hw).requests.len(), 1 + ApiVersion::NEGOTIATION_ORDER.len());
    }

    #[test]
    fn xcast_mode() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        assert_eq!(hw.update_xcast_mode(XcastMode::Promisc), Err(VfError::NotSupported));
        assert_eq!(pf(&hw).requests.len(), 1);

        hw.negotiate_api().unwrap();
        hw.update_xcast_mode(XcastMode::AllMulti).unwrap();
        assert_eq!(pf(&hw).xcast_mode, Some(XcastMode::AllMulti));

        pf_mut(&mut hw).deny_xcast = true;
        assert_eq!(hw.update_xcast_mode(XcastMode::Promisc), Err(VfError::PermissionDenied));
    }

    #[test]
    fn xcast_mode_needs_api_1_2() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        hw.negotiate_api_version(ApiVersion::V1_1).unwrap();
        assert_eq!(hw.update_xcast_mode(XcastMode::Multi), Err(VfError::NotSupported));
    }

    #[test]
    fn promisc_needs_api_1_3() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        hw.negotiate_api_version(ApiVersion::V1_2).unwrap();
        let sent = pf(&hw).requests.len();

        assert_eq!(hw.update_xcast_mode(XcastMode::Promisc), Err(VfError::NotSupported));
        assert_eq!(pf(&hw).requests.len(), sent);
        hw.update_xcast_mode(XcastMode::AllMulti).unwrap();
        assert_eq!(pf(&hw).xcast_mode, Some(XcastMode::AllMulti));

        hw.negotiate_api_version(ApiVersion::V1_3).unwrap();
        hw.update_xcast_mode(XcastMode::Promisc).unwrap();
        assert_eq!(pf(&hw).xcast_mode, Some(XcastMode::Promisc));
    }

    #[test]
    fn queue_query() {
        let mut fake = FakePf::new();
        fake.queues = [12, 3, 9, 5];
        let mut hw = ready_hw(fake, MacType::Vf82599);

        // API 1.0 can't ask
        assert_eq!(hw.get_queues(), Ok(QueueConfig::default()));
        assert_eq!(pf(&hw).requests.len(), 1);

        hw.negotiate_api().unwrap();
        let queues = hw.get_queues().unwrap();
        assert_eq!(queues, QueueConfig { max_tx_queues: 8, max_rx_queues: 3, num_tcs: 1, default_tc: 5 });
        assert_eq!(hw.queues(), queues);

        // stop now covers every queue
        hw.stop_adapter();
        assert_eq!(pf(&hw).register(ixgbe_vftxdctl(7)), IXGBE_TXDCTL_SWFLSH);
    }

    #[test]
    fn statistics() {
        let mut hw = ready_hw(FakePf::new(), MacType::Vf82599);
        hw.set_vfta(1, true).unwrap();
        let stats = hw.mailbox_stats();
        assert_eq!(stats.msgs_tx, 2);
        assert_eq!(stats.msgs_rx, 1);
        assert_eq!(stats.acks, 2);
    }
}

//! A scripted PF behind a fake VF register window, plus the fakes for config space and time.
//!
//! [`FakePf`] behaves like the VF BAR of a real device: VFMAILBOX has read-to-clear bits,
//! the VFU lock, and the reset indications; a REQ makes the "PF" decode the request,
//! acknowledge it and post a reply according to the public script fields.

use alloc::collections::BTreeMap;
use alloc::vec;
use alloc::vec::Vec;

use crate::config::*;
use crate::hv::{PciConfigSpace, IXGBE_HV_RESET_OFFSET};
use crate::mailbox::VfMailboxFlags;
use crate::msg::*;
use crate::regs::*;

pub struct FakePf {
    registers: BTreeMap<u32, u32>,
    mbmem: [u32; IXGBE_VFMAILBOX_SIZE],
    /// Read-to-clear indications waiting to be read.
    pending: u32,
    vfu: bool,
    rsti: bool,
    rsti_reads_left: u32,
    removed: bool,

    /// The PF owns the buffer, so VFU is never granted.
    pub pf_holds_lock: bool,
    /// Requests are recorded but neither acknowledged nor answered.
    pub silent: bool,
    /// Requests are acknowledged but never answered.
    pub no_reply: bool,
    /// Replaces the next reply.
    pub reply_override: Option<MailboxMessage>,
    /// Number of VFMAILBOX reads that still show RSTI after VFCTRL.RST.
    pub reset_reads: u32,
    /// RSTI stays up forever after VFCTRL.RST.
    pub hold_reset: bool,
    pub perm_addr: [u8; 6],
    pub mc_filter_type: u32,
    pub nack_reset: bool,
    pub reject_mac: bool,
    pub macvlan_capacity: usize,
    pub supported_apis: Vec<ApiVersion>,
    /// Tx queues, Rx queues, traffic classes, default queue.
    pub queues: [u32; 4],
    pub reta: [u32; 8],
    pub rss_key: [u8; IXGBEVF_RSS_HASH_KEY_SIZE],
    pub deny_rss: bool,
    pub deny_xcast: bool,

    /// Every request received, in order.
    pub requests: Vec<Request>,
    pub mac_addr: Option<[u8; 6]>,
    pub macvlans: Vec<[u8; 6]>,
    pub mc_vectors: Vec<u16>,
    pub vlans: Vec<u32>,
    pub max_frame_size: u32,
    pub xcast_mode: Option<XcastMode>,
    pub api: Option<ApiVersion>,
    /// Function level resets issued through VFCTRL.
    pub function_resets: u32,
}

impl FakePf {
    pub fn new() -> FakePf {
        let mut rss_key = [0; IXGBEVF_RSS_HASH_KEY_SIZE];
        for (i, byte) in rss_key.iter_mut().enumerate() {
            *byte = i as u8 + 1;
        }
        FakePf {
            registers: BTreeMap::new(),
            mbmem: [0; IXGBE_VFMAILBOX_SIZE],
            pending: 0,
            vfu: false,
            rsti: false,
            rsti_reads_left: 0,
            removed: false,
            pf_holds_lock: false,
            silent: false,
            no_reply: false,
            reply_override: None,
            reset_reads: 3,
            hold_reset: false,
            perm_addr: [0x02, 0x1B, 0x21, 0x3C, 0x4D, 0x5E],
            mc_filter_type: 0,
            nack_reset: false,
            reject_mac: false,
            macvlan_capacity: 2,
            supported_apis: vec![ApiVersion::V1_0, ApiVersion::V1_1, ApiVersion::V1_2, ApiVersion::V1_3],
            queues: [2, 2, 0, 0],
            reta: [0xE4E4_E4E4; 8],
            rss_key,
            deny_rss: false,
            deny_xcast: false,
            requests: Vec::new(),
            mac_addr: None,
            macvlans: Vec::new(),
            mc_vectors: Vec::new(),
            vlans: Vec::new(),
            max_frame_size: 0,
            xcast_mode: None,
            api: None,
            function_resets: 0,
        }
    }

    /// Sets a plain register as the device would report it.
    pub fn set_register(&mut self, offset: u32, value: u32) {
        self.registers.insert(offset, value);
    }

    /// The stored value of a register, without any read side effects.
    pub fn register(&self, offset: u32) -> u32 {
        match mbmem_index(offset) {
            Some(i) => self.mbmem[i],
            None => self.registers.get(&offset).copied().unwrap_or(0),
        }
    }

    pub fn remove_device(&mut self) {
        self.removed = true;
    }

    pub fn restore_device(&mut self) {
        self.removed = false;
    }

    pub fn post_pending(&mut self, flags: VfMailboxFlags) {
        self.pending |= flags.bits();
    }

    /// The PF starts resetting the VF: RSTI goes up.
    pub fn begin_pf_reset(&mut self) {
        self.rsti = true;
    }

    /// The PF finished: RSTI drops and RSTD is latched.
    pub fn end_pf_reset(&mut self) {
        self.rsti = false;
        self.pending |= VfMailboxFlags::RSTD.bits();
    }

    pub fn vf_owns_mailbox(&self) -> bool {
        self.vfu
    }

    fn read_mailbox(&mut self) -> u32 {
        let mut value = self.pending;
        self.pending &= !VfMailboxFlags::R2C_BITS.bits();
        if self.vfu {
            value |= VfMailboxFlags::VFU.bits();
        }
        if self.rsti || self.rsti_reads_left > 0 {
            value |= VfMailboxFlags::RSTI.bits();
            self.rsti_reads_left = self.rsti_reads_left.saturating_sub(1);
        }
        value
    }

    fn write_mailbox(&mut self, value: u32) {
        let flags = VfMailboxFlags::from_bits_truncate(value);
        if flags.contains(VfMailboxFlags::VFU) && !self.pf_holds_lock {
            self.vfu = true;
        }
        if flags.contains(VfMailboxFlags::REQ) {
            self.vfu = false;
            self.receive();
        }
        if flags.contains(VfMailboxFlags::ACK) {
            self.vfu = false;
        }
    }

    fn function_level_reset(&mut self) {
        self.function_resets += 1;
        self.pending |= VfMailboxFlags::RSTD.bits();
        if self.hold_reset {
            self.rsti = true;
        } else {
            self.rsti_reads_left = self.reset_reads;
        }
    }

    fn receive(&mut self) {
        let request = match Request::decode(&MailboxMessage::from_words(&self.mbmem)) {
            Ok(request) => request,
            Err(_) => return,
        };
        self.requests.push(request.clone());
        if self.silent {
            return;
        }
        self.pending |= VfMailboxFlags::PFACK.bits();

        let reply = match self.reply_override.take() {
            Some(reply) => reply,
            None => self.respond(&request),
        };
        if self.no_reply {
            return;
        }
        for (slot, word) in self.mbmem.iter_mut().zip(reply.words()) {
            *slot = *word;
        }
        self.pending |= VfMailboxFlags::PFSTS.bits();
    }

    fn respond(&mut self, request: &Request) -> MailboxMessage {
        let opcode = request.opcode();
        let ack = MessageHeader::new(opcode).with_type(MsgType::ACK | MsgType::CTS).0;
        let nack = MessageHeader::new(opcode).with_type(MsgType::NACK | MsgType::CTS).0;

        match request {
            Request::Reset => {
                self.macvlans.clear();
                self.api = None;
                if self.nack_reset {
                    return MailboxMessage::from_words(&[nack, 0, 0, 0]);
                }
                let mut reply = PermAddrReply {
                    perm_addr: self.perm_addr,
                    mc_filter_type: self.mc_filter_type,
                }.encode();
                reply.set_word(0, reply.word(0) | MsgType::CTS.bits());
                reply
            }
            Request::SetMacAddr(addr) => {
                if self.reject_mac {
                    return MailboxMessage::from_words(&[nack, 0, 0]);
                }
                self.mac_addr = Some(*addr);
                let mut reply = request.encode();
                reply.set_word(0, ack);
                reply
            }
            Request::SetMulticast(vectors) => {
                self.mc_vectors = vectors.clone();
                MailboxMessage::from_words(&[ack])
            }
            Request::SetVlan { vlan, vlan_on } => {
                if *vlan_on {
                    self.vlans.push(*vlan);
                } else {
                    self.vlans.retain(|v| v != vlan);
                }
                MailboxMessage::from_words(&[ack])
            }
            Request::SetLpe { max_frame_size } => {
                self.max_frame_size = *max_frame_size;
                MailboxMessage::from_words(&[ack])
            }
            Request::SetMacVlan { index, addr } => {
                if *index == 0 {
                    self.macvlans.clear();
                } else if self.macvlans.len() >= self.macvlan_capacity {
                    return MailboxMessage::from_words(&[nack, 0, 0]);
                } else {
                    self.macvlans.push(addr.unwrap_or([0; 6]));
                }
                MailboxMessage::from_words(&[ack, 0, 0])
            }
            Request::ApiNegotiate(api) => {
                if self.supported_apis.contains(api) {
                    self.api = Some(*api);
                    MailboxMessage::from_words(&[ack, u32::from(*api), 0])
                } else {
                    MailboxMessage::from_words(&[nack, u32::from(*api), 0])
                }
            }
            Request::GetQueues => {
                let [tx, rx, tcs, def] = self.queues;
                MailboxMessage::from_words(&[ack, tx, rx, tcs, def])
            }
            Request::GetReta => {
                if self.deny_rss {
                    return MailboxMessage::from_words(&[nack]);
                }
                let mut words = vec![ack];
                words.extend_from_slice(&self.reta);
                MailboxMessage::from_words(&words)
            }
            Request::GetRssKey => {
                if self.deny_rss {
                    return MailboxMessage::from_words(&[nack]);
                }
                let mut words = vec![ack];
                words.extend(self.rss_key.chunks_exact(4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]])));
                MailboxMessage::from_words(&words)
            }
            Request::UpdateXcastMode(mode) => {
                if self.deny_xcast {
                    return MailboxMessage::from_words(&[nack, u32::from(*mode)]);
                }
                self.xcast_mode = Some(*mode);
                MailboxMessage::from_words(&[ack, u32::from(*mode)])
            }
        }
    }
}

fn mbmem_index(offset: u32) -> Option<usize> {
    let end = ixgbe_vfmbmem(IXGBE_VFMAILBOX_SIZE as u32);
    if (IXGBE_VFMBMEM..end).contains(&offset) {
        Some(((offset - IXGBE_VFMBMEM) / 4) as usize)
    } else {
        None
    }
}

impl RegisterAccess for FakePf {
    fn read32(&mut self, offset: u32) -> u32 {
        if self.removed {
            return IXGBE_FAILED_READ_REG;
        }
        if offset == IXGBE_VFMAILBOX {
            return self.read_mailbox();
        }
        self.register(offset)
    }

    fn write32(&mut self, offset: u32, value: u32) {
        if self.removed {
            return;
        }
        if offset == IXGBE_VFMAILBOX {
            return self.write_mailbox(value);
        }
        if let Some(i) = mbmem_index(offset) {
            self.mbmem[i] = value;
            return;
        }
        if offset == IXGBE_VFCTRL && value & IXGBE_CTRL_RST != 0 {
            self.function_level_reset();
            self.registers.insert(offset, value & !IXGBE_CTRL_RST);
            return;
        }
        self.registers.insert(offset, value);
    }
}


/// A [`Delay`] that adds up the requested waits instead of waiting.
#[derive(Debug, Default)]
pub struct FakeClock {
    pub elapsed_us: u64,
    pub sleeps: u32,
}

impl Delay for FakeClock {
    fn udelay(&mut self, us: u32) {
        self.elapsed_us += us as u64;
    }

    fn msleep(&mut self, ms: u32) {
        self.sleeps += 1;
        self.elapsed_us += ms as u64 * 1000;
    }
}


/// PCI configuration space of a Hyper-V VF. `Default` has no extended config space.
#[derive(Debug, Default)]
pub struct FakeConfigSpace {
    pub perm_addr: Option<[u8; 6]>,
}

impl FakeConfigSpace {
    pub fn with_perm_addr(perm_addr: [u8; 6]) -> FakeConfigSpace {
        FakeConfigSpace { perm_addr: Some(perm_addr) }
    }
}

impl PciConfigSpace for FakeConfigSpace {
    fn pci_read_8(&self, offset: u16) -> Option<u8> {
        let perm_addr = self.perm_addr?;
        let start = IXGBE_HV_RESET_OFFSET;
        if (start..start + 6).contains(&offset) {
            Some(perm_addr[(offset - start) as usize])
        } else {
            Some(0)
        }
    }
}

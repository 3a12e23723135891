//! The messages exchanged with the PF over the mailbox.
//!
//! Every message starts with a header word:
//! * bits `[15:0]`: the [`Opcode`],
//! * bits `[23:16]`: an opcode-specific info field (a count, an index, a flag),
//! * bits `[31:29]`: the [`MsgType`] flags the PF sets in its reply.
//!
//! Requests are built as a [`Request`] and serialized with [`Request::encode()`];
//! replies are read back as a raw [`MailboxMessage`] and checked against the opcode that was sent.

use alloc::vec::Vec;
use bit_field::BitField;
use bitflags::bitflags;
use core::fmt;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use zerocopy::{AsBytes, FromBytes, Unaligned};
use zerocopy::byteorder::{LittleEndian, U32};

use crate::config::*;
use crate::error::{VfError, VfResult};

/// Opcodes of VF-originated requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u16)]
pub enum Opcode {
    /// VF requests reset
    Reset               = 0x01,
    /// VF requests PF to set MAC addr
    SetMacAddr          = 0x02,
    /// VF requests PF to set MC addr
    SetMulticast        = 0x03,
    /// VF requests PF to set VLAN
    SetVlan             = 0x04,
    /// VF requests PF to set VMOLR.LPE
    SetLpe              = 0x05,
    /// VF requests PF for unicast filter
    SetMacVlan          = 0x06,
    /// negotiate API version
    ApiNegotiate        = 0x08,
    /// get queue configuration
    GetQueues           = 0x09,
    /// get RSS redirection table
    GetReta             = 0x0A,
    /// get RSS hash key
    GetRssKey           = 0x0B,
    /// set unicast/multicast promiscuity
    UpdateXcastMode     = 0x0C,
}

bitflags! {
    /// Reply flags in the top bits of the header word.
    pub struct MsgType: u32 {
        /// The PF accepted the request.
        const ACK       = 0x8000_0000;
        /// The PF rejected the request.
        const NACK      = 0x4000_0000;
        /// The VF is still clear to send requests.
        const CTS       = 0x2000_0000;
        const SUCCESS   = Self::ACK.bits;
        const FAILURE   = Self::NACK.bits;
    }
}

/// Shift of the info field in the header word.
pub const IXGBE_VT_MSGINFO_SHIFT: usize = 16;
/// Mask of the info field in the header word.
pub const IXGBE_VT_MSGINFO_MASK: u32 = 0xFF << IXGBE_VT_MSGINFO_SHIFT;

/// Length of the permanent address message returned by the PF after a reset.
pub const IXGBE_VF_PERMADDR_MSG_LEN: usize = 4;
/// Word of the permanent address message holding the multicast filter type.
pub const IXGBE_VF_MC_TYPE_WORD: usize = 3;

/// Indices of the data words in a `GetQueues` reply.
pub const IXGBE_VF_TX_QUEUES: usize = 1;
pub const IXGBE_VF_RX_QUEUES: usize = 2;
pub const IXGBE_VF_TRANS_VLAN: usize = 3;
pub const IXGBE_VF_DEF_QUEUE: usize = 4;
pub const IXGBE_VF_GET_QUEUES_MSG_LEN: usize = 5;

/// Words in a `GetReta` reply: the header plus 16 two-bit entries per word.
pub const IXGBE_VF_RETA_MSG_LEN: usize = 1 + IXGBEVF_82599_RETA_SIZE / 16;
/// Words in a `GetRssKey` reply.
pub const IXGBE_VF_RSS_KEY_MSG_LEN: usize = 1 + IXGBEVF_RSS_HASH_KEY_SIZE / 4;

/// One mailbox word is the header, the remaining 15 hold two 16-bit hash vectors each.
pub const IXGBE_VF_MAX_MC_VECTORS: usize = 30;

/// Revisions of the PF/VF mailbox API, with their wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum ApiVersion {
    V1_0 = 0,
    V2_0 = 1,
    V1_1 = 2,
    V1_2 = 3,
    V1_3 = 4,
    V1_4 = 5,
    V1_5 = 6,
    V1_6 = 7,
    V1_7 = 8,
}

impl ApiVersion {
    /// The versions offered during negotiation, newest first.
    pub const NEGOTIATION_ORDER: [ApiVersion; 6] = [
        ApiVersion::V1_5,
        ApiVersion::V1_4,
        ApiVersion::V1_3,
        ApiVersion::V1_2,
        ApiVersion::V1_1,
        ApiVersion::V1_0,
    ];

    /// Whether the PF answers `GetReta` and `GetRssKey` under this version.
    pub fn supports_rss_query(self) -> bool {
        matches!(self,
            ApiVersion::V1_2 | ApiVersion::V1_3 | ApiVersion::V1_5 | ApiVersion::V1_6 | ApiVersion::V1_7
        )
    }

    /// Whether the PF answers `GetQueues` under this version.
    pub fn supports_queue_query(self) -> bool {
        !matches!(self, ApiVersion::V1_0 | ApiVersion::V2_0)
    }

    /// Whether the PF accepts `UpdateXcastMode` under this version.
    pub fn supports_xcast_mode(self) -> bool {
        !matches!(self, ApiVersion::V1_0 | ApiVersion::V2_0 | ApiVersion::V1_1)
    }
}

/// Receive filtering modes requested with `UpdateXcastMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
#[repr(u32)]
pub enum XcastMode {
    None        = 0,
    Multi       = 1,
    AllMulti    = 2,
    Promisc     = 3,
}

/// Which 12 bits of a multicast address select the MTA bit, as configured by the PF.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u32)]
pub enum McFilterType {
    Bits47To36  = 0,
    Bits46To35  = 1,
    Bits45To34  = 2,
    Bits43To32  = 3,
}

/// Extracts the 12-bit multicast table vector of `mc_addr` for the given filter type.
///
/// An invalid filter type is logged and yields vector 0.
pub fn mta_vector(mc_filter_type: u32, mc_addr: &[u8; 6]) -> u16 {
    let lo = mc_addr[4] as u32;
    let hi = mc_addr[5] as u32;
    let vector = match McFilterType::try_from(mc_filter_type) {
        Ok(McFilterType::Bits47To36) => (lo >> 4) | (hi << 4),
        Ok(McFilterType::Bits46To35) => (lo >> 3) | (hi << 5),
        Ok(McFilterType::Bits45To34) => (lo >> 2) | (hi << 6),
        Ok(McFilterType::Bits43To32) => lo | (hi << 8),
        Err(_) => {
            debug!("ixgbevf: MC filter type param set incorrectly: {}", mc_filter_type);
            0
        }
    };
    (vector & 0xFFF) as u16
}


/// The first word of every mailbox message.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader(pub u32);

impl MessageHeader {
    pub fn new(opcode: Opcode) -> MessageHeader {
        MessageHeader(u16::from(opcode) as u32)
    }

    pub fn with_info(mut self, info: u8) -> MessageHeader {
        self.0.set_bits(16..24, info as u32);
        self
    }

    pub fn with_type(self, msg_type: MsgType) -> MessageHeader {
        MessageHeader(self.0 | msg_type.bits())
    }

    pub fn opcode_bits(&self) -> u16 {
        self.0.get_bits(0..16) as u16
    }

    pub fn opcode(&self) -> Option<Opcode> {
        Opcode::try_from(self.opcode_bits()).ok()
    }

    pub fn info(&self) -> u8 {
        self.0.get_bits(16..24) as u8
    }

    pub fn msg_type(&self) -> MsgType {
        MsgType::from_bits_truncate(self.0)
    }

    /// The header with the clear-to-send flag removed, which is how replies are compared.
    pub fn without_cts(self) -> MessageHeader {
        MessageHeader(self.0 & !MsgType::CTS.bits())
    }

    /// Whether this is exactly `opcode` with `msg_type`, ignoring CTS.
    pub fn is(&self, opcode: Opcode, msg_type: MsgType) -> bool {
        self.without_cts() == MessageHeader::new(opcode).with_type(msg_type)
    }
}

impl fmt::Debug for MessageHeader {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("MessageHeader")
            .field("opcode", &self.opcode_bits())
            .field("info", &self.info())
            .field("type", &self.msg_type())
            .finish()
    }
}


/// A message as it sits in the shared mailbox memory.
#[derive(Clone, PartialEq, Eq)]
pub struct MailboxMessage {
    words: [u32; IXGBE_VFMAILBOX_SIZE],
    len: usize,
}

impl MailboxMessage {
    /// A zeroed message of `len` words, capped at the mailbox size.
    pub fn new(len: usize) -> MailboxMessage {
        MailboxMessage { words: [0; IXGBE_VFMAILBOX_SIZE], len: len.min(IXGBE_VFMAILBOX_SIZE) }
    }

    /// Copies at most one mailbox worth of `words`.
    pub fn from_words(words: &[u32]) -> MailboxMessage {
        let mut msg = MailboxMessage::new(words.len());
        msg.words[..msg.len].copy_from_slice(&words[..msg.len]);
        msg
    }

    /// Builds a message from its little-endian byte image; a trailing partial word is dropped.
    pub fn from_bytes(bytes: &[u8]) -> MailboxMessage {
        let mut msg = MailboxMessage::new(bytes.len() / 4);
        for (word, chunk) in msg.words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        msg
    }

    /// The little-endian byte image of the whole mailbox; bytes past `len()` words are zero.
    pub fn to_bytes(&self) -> [u8; IXGBE_VFMAILBOX_SIZE * 4] {
        let mut bytes = [0; IXGBE_VFMAILBOX_SIZE * 4];
        for (chunk, word) in bytes.chunks_exact_mut(4).zip(self.words()) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn words(&self) -> &[u32] {
        &self.words[..self.len]
    }

    /// Word `index`, or 0 if the message is shorter.
    pub fn word(&self, index: usize) -> u32 {
        self.words().get(index).copied().unwrap_or(0)
    }

    pub fn set_word(&mut self, index: usize, value: u32) {
        if index < self.len {
            self.words[index] = value;
        }
    }

    pub fn header(&self) -> MessageHeader {
        MessageHeader(self.word(0))
    }

    /// Fails with [`VfError::ProtocolMismatch`] unless the header is `opcode` with `msg_type`.
    pub fn expect(&self, opcode: Opcode, msg_type: MsgType) -> VfResult<()> {
        if self.header().is(opcode, msg_type) {
            Ok(())
        } else {
            Err(VfError::ProtocolMismatch {
                expected: MessageHeader::new(opcode).with_type(msg_type).0,
                received: self.header().without_cts().0,
            })
        }
    }
}

impl fmt::Debug for MailboxMessage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?} {:08X?}", self.header(), &self.words()[1.min(self.len)..])
    }
}


/// Layout of a request or reply carrying a MAC address in words 1 and 2.
#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct MacAddrMessage {
    header:             U32<LittleEndian>,
    addr:               [u8; 6],
    _padding:           [u8; 2],
}

/// Layout of the reply to a reset request.
#[derive(FromBytes, AsBytes, Unaligned)]
#[repr(C)]
struct PermAddrMessage {
    header:             U32<LittleEndian>,
    perm_addr:          [u8; 6],
    _padding:           [u8; 2],
    mc_filter_type:     U32<LittleEndian>,
}

const _: () = assert!(core::mem::size_of::<MacAddrMessage>() == 3 * 4);
const _: () = assert!(core::mem::size_of::<PermAddrMessage>() == IXGBE_VF_PERMADDR_MSG_LEN * 4);

fn mac_addr_message(header: MessageHeader, addr: [u8; 6]) -> MailboxMessage {
    let msg = MacAddrMessage {
        header: U32::new(header.0),
        addr,
        _padding: [0; 2],
    };
    MailboxMessage::from_bytes(msg.as_bytes())
}

fn mac_addr_of(msg: &MailboxMessage) -> [u8; 6] {
    MacAddrMessage::read_from_prefix(&msg.to_bytes()[..])
        .map(|m| m.addr)
        .unwrap_or([0; 6])
}


/// A request from the VF to the PF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Reset,
    SetMacAddr([u8; 6]),
    /// Multicast table vectors, at most [`IXGBE_VF_MAX_MC_VECTORS`] of them.
    SetMulticast(Vec<u16>),
    SetVlan { vlan: u32, vlan_on: bool },
    SetLpe { max_frame_size: u32 },
    /// Index 0 clears the VF's extra unicast filters, 1 and up appends `addr`.
    SetMacVlan { index: u8, addr: Option<[u8; 6]> },
    ApiNegotiate(ApiVersion),
    GetQueues,
    GetReta,
    GetRssKey,
    UpdateXcastMode(XcastMode),
}

impl Request {
    /// Builds a multicast list update from addresses, hashing each with `mc_filter_type`.
    /// Addresses past the first [`IXGBE_VF_MAX_MC_VECTORS`] are dropped.
    pub fn set_multicast(mc_filter_type: u32, mc_addrs: &[[u8; 6]]) -> Request {
        debug!("ixgbevf: MC Addr Count = {}", mc_addrs.len());
        if mc_addrs.len() > IXGBE_VF_MAX_MC_VECTORS {
            debug!("ixgbevf: dropping {} multicast addresses beyond the mailbox limit",
                mc_addrs.len() - IXGBE_VF_MAX_MC_VECTORS);
        }
        let vectors = mc_addrs.iter()
            .take(IXGBE_VF_MAX_MC_VECTORS)
            .map(|addr| {
                let vector = mta_vector(mc_filter_type, addr);
                trace!("ixgbevf: Hash value = {:#05X}", vector);
                vector
            })
            .collect();
        Request::SetMulticast(vectors)
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Reset => Opcode::Reset,
            Request::SetMacAddr(_) => Opcode::SetMacAddr,
            Request::SetMulticast(_) => Opcode::SetMulticast,
            Request::SetVlan { .. } => Opcode::SetVlan,
            Request::SetLpe { .. } => Opcode::SetLpe,
            Request::SetMacVlan { .. } => Opcode::SetMacVlan,
            Request::ApiNegotiate(_) => Opcode::ApiNegotiate,
            Request::GetQueues => Opcode::GetQueues,
            Request::GetReta => Opcode::GetReta,
            Request::GetRssKey => Opcode::GetRssKey,
            Request::UpdateXcastMode(_) => Opcode::UpdateXcastMode,
        }
    }

    /// Serializes the request into the words that are copied to the mailbox.
    pub fn encode(&self) -> MailboxMessage {
        let header = MessageHeader::new(self.opcode());
        match self {
            Request::Reset | Request::GetReta | Request::GetRssKey => {
                MailboxMessage::from_words(&[header.0])
            }
            Request::SetMacAddr(addr) => mac_addr_message(header, *addr),
            Request::SetMulticast(vectors) => {
                let count = vectors.len().min(IXGBE_VF_MAX_MC_VECTORS);
                // the whole mailbox is always sent for this request
                let mut msg = MailboxMessage::new(IXGBE_VFMAILBOX_SIZE);
                msg.set_word(0, header.with_info(count as u8).0);
                for (i, vector) in vectors.iter().take(count).enumerate() {
                    let index = 1 + i / 2;
                    let mut word = msg.word(index);
                    let shift = (16 * (i % 2)) as u8;
                    word.set_bits(shift..shift + 16, *vector as u32);
                    msg.set_word(index, word);
                }
                msg
            }
            Request::SetVlan { vlan, vlan_on } => {
                MailboxMessage::from_words(&[header.with_info(*vlan_on as u8).0, *vlan])
            }
            Request::SetLpe { max_frame_size } => {
                MailboxMessage::from_words(&[header.0, *max_frame_size])
            }
            Request::SetMacVlan { index, addr } => {
                mac_addr_message(header.with_info(*index), addr.unwrap_or([0; 6]))
            }
            Request::ApiNegotiate(api) => {
                MailboxMessage::from_words(&[header.0, u32::from(*api), 0])
            }
            Request::GetQueues => {
                let mut msg = MailboxMessage::new(IXGBE_VF_GET_QUEUES_MSG_LEN);
                msg.set_word(0, header.0);
                msg
            }
            Request::UpdateXcastMode(mode) => {
                MailboxMessage::from_words(&[header.0, u32::from(*mode)])
            }
        }
    }

    /// Parses the words of a request back into a [`Request`].
    pub fn decode(msg: &MailboxMessage) -> VfResult<Request> {
        let header = msg.header();
        let mismatch = VfError::ProtocolMismatch { expected: 0, received: header.0 };
        let opcode = header.opcode().ok_or(mismatch)?;
        let request = match opcode {
            Opcode::Reset => Request::Reset,
            Opcode::SetMacAddr => Request::SetMacAddr(mac_addr_of(msg)),
            Opcode::SetMulticast => {
                let count = (header.info() as usize).min(IXGBE_VF_MAX_MC_VECTORS);
                let vectors = (0..count)
                    .map(|i| {
                        let shift = (16 * (i % 2)) as u8;
                        msg.word(1 + i / 2).get_bits(shift..shift + 16) as u16
                    })
                    .collect();
                Request::SetMulticast(vectors)
            }
            Opcode::SetVlan => Request::SetVlan { vlan: msg.word(1), vlan_on: header.info() != 0 },
            Opcode::SetLpe => Request::SetLpe { max_frame_size: msg.word(1) },
            Opcode::SetMacVlan => {
                let addr = mac_addr_of(msg);
                Request::SetMacVlan {
                    index: header.info(),
                    addr: if addr == [0; 6] { None } else { Some(addr) },
                }
            }
            Opcode::ApiNegotiate => {
                Request::ApiNegotiate(ApiVersion::try_from(msg.word(1)).map_err(|_| mismatch)?)
            }
            Opcode::GetQueues => Request::GetQueues,
            Opcode::GetReta => Request::GetReta,
            Opcode::GetRssKey => Request::GetRssKey,
            Opcode::UpdateXcastMode => {
                Request::UpdateXcastMode(XcastMode::try_from(msg.word(1)).map_err(|_| mismatch)?)
            }
        };
        Ok(request)
    }
}


/// The PF's answer to a reset request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PermAddrReply {
    pub perm_addr: [u8; 6],
    pub mc_filter_type: u32,
}

impl PermAddrReply {
    /// Accepts only a `Reset | ACK` reply; anything else means the address can't be trusted.
    pub fn parse(msg: &MailboxMessage) -> VfResult<PermAddrReply> {
        if !msg.header().is(Opcode::Reset, MsgType::ACK) {
            return Err(VfError::InvalidMacAddress);
        }
        let reply = PermAddrMessage::read_from_prefix(&msg.to_bytes()[..])
            .ok_or(VfError::InvalidMacAddress)?;
        Ok(PermAddrReply {
            perm_addr: reply.perm_addr,
            mc_filter_type: reply.mc_filter_type.get(),
        })
    }

    /// The reply a PF sends for this address, as used by PF-side code and tests.
    pub fn encode(&self) -> MailboxMessage {
        let msg = PermAddrMessage {
            header: U32::new(MessageHeader::new(Opcode::Reset).with_type(MsgType::ACK).0),
            perm_addr: self.perm_addr,
            _padding: [0; 2],
            mc_filter_type: U32::new(self.mc_filter_type),
        };
        MailboxMessage::from_bytes(msg.as_bytes())
    }
}

/// Queue layout reported by the PF for this VF.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueConfig {
    pub max_tx_queues: u32,
    pub max_rx_queues: u32,
    /// Number of traffic classes, 0 unless the PF enabled DCB.
    pub num_tcs: u32,
    /// Queue used for traffic without a class.
    pub default_tc: u32,
}

impl Default for QueueConfig {
    fn default() -> QueueConfig {
        QueueConfig { max_tx_queues: 1, max_rx_queues: 1, num_tcs: 0, default_tc: 0 }
    }
}

impl QueueConfig {
    /// Reads a `GetQueues | ACK` reply, replacing out-of-range counts with safe values.
    pub fn parse(msg: &MailboxMessage) -> VfResult<QueueConfig> {
        msg.expect(Opcode::GetQueues, MsgType::ACK)?;

        let clamp = |count: u32, max: u32| if count == 0 || count > max { max } else { count };
        let max_tx_queues = clamp(msg.word(IXGBE_VF_TX_QUEUES), IXGBE_VF_MAX_TX_QUEUES);
        let max_rx_queues = clamp(msg.word(IXGBE_VF_RX_QUEUES), IXGBE_VF_MAX_RX_QUEUES);

        let mut num_tcs = msg.word(IXGBE_VF_TRANS_VLAN);
        if num_tcs > max_rx_queues {
            num_tcs = 1;
        }
        let mut default_tc = msg.word(IXGBE_VF_DEF_QUEUE);
        if default_tc >= max_tx_queues {
            default_tc = 0;
        }

        Ok(QueueConfig { max_tx_queues, max_rx_queues, num_tcs, default_tc })
    }
}

/// Expands the 2-bit packed redirection table of a `GetReta` reply.
///
/// The VF uses at most two Rx queues, so every entry is masked to one bit,
/// or to zero when only one queue is configured.
pub fn unpack_reta(msg: &MailboxMessage, num_rx_queues: u16) -> Vec<u8> {
    let mask = if num_rx_queues > 1 { 0x1 } else { 0x0 };
    let dwords = IXGBEVF_82599_RETA_SIZE / 16;
    let mut reta = Vec::with_capacity(IXGBEVF_82599_RETA_SIZE);
    for i in 0..dwords {
        let packed = msg.word(1 + i);
        for j in 0..16 {
            reta.push(((packed >> (2 * j)) & mask) as u8);
        }
    }
    reta
}

/// Copies the RSS key out of a `GetRssKey` reply.
pub fn rss_key_of(msg: &MailboxMessage) -> [u8; IXGBEVF_RSS_HASH_KEY_SIZE] {
    let mut key = [0; IXGBEVF_RSS_HASH_KEY_SIZE];
    key.copy_from_slice(&msg.to_bytes()[4..4 + IXGBEVF_RSS_HASH_KEY_SIZE]);
    key
}

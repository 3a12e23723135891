//! VFs passed through by Hyper-V.
//!
//! Under Hyper-V there is no PF driver answering the mailbox. The host places the
//! permanent MAC address in extended PCI configuration space and the VF is fixed to
//! API 1.0, so filters, VLANs and receive modes can't be requested at all.
//! The frame size limit is programmed directly into RXDCTL of queue 0.

use crate::config::*;
use crate::error::{VfError, VfResult};
use crate::hw::{MacType, VfHw, VfState};
use crate::link::{decode_links, LinkStatus};
use crate::msg::ApiVersion;
use crate::regs::*;

/// Offset in PCI configuration space where Hyper-V places the permanent MAC address.
pub const IXGBE_HV_RESET_OFFSET: u16 = 0x201;

/// Length of the CRC that RXDCTL.RLPML counts on top of the frame.
const IXGBE_HV_CRC_LEN: u32 = 4;

/// Number of extra VFLINKS reads on 82599 before a link-up is believed.
const IXGBE_82599_LINK_DEBOUNCE_READS: u32 = 5;
const IXGBE_82599_LINK_DEBOUNCE_US: u32 = 100;

/// Byte access to the PCI configuration space of the VF.
///
/// Offsets beyond 0xFF need the extended (memory mapped) configuration space;
/// an implementation without it returns `None`.
pub trait PciConfigSpace {
    fn pci_read_8(&self, offset: u16) -> Option<u8>;
}

impl<R: RegisterAccess, D: Delay> VfHw<R, D> {
    /// "Resets" a Hyper-V VF: the only thing to do is to fetch the permanent address
    /// from configuration space. The mailbox stays disarmed and the API stays at 1.0.
    pub fn hv_reset_hw<P: PciConfigSpace>(&mut self, pci: &P) -> VfResult<()> {
        self.api_version = ApiVersion::V1_0;

        let mut perm_addr = [0; IXGBE_ETH_LENGTH_OF_ADDRESS];
        for (i, byte) in perm_addr.iter_mut().enumerate() {
            match pci.pci_read_8(IXGBE_HV_RESET_OFFSET + i as u16) {
                Some(b) => *byte = b,
                None => {
                    error!("ixgbevf: extended PCI config space is needed for Hyper-V");
                    self.state = VfState::PermAddrInvalid;
                    return Err(VfError::NotSupported);
                }
            }
        }

        self.perm_addr = perm_addr;
        self.state = VfState::Ready;
        debug!("ixgbevf: Hyper-V permanent address {:X?}", self.perm_addr);
        Ok(())
    }

    /// Reads VFLINKS directly; there is no PF whose reset could hold the link down.
    /// An 82599 link-up is only trusted after it survived several more reads.
    pub fn hv_check_mac_link(&mut self) -> VfResult<LinkStatus> {
        let mut links_reg = self.regs.read(IXGBE_VFLINKS);
        if self.mac_type == MacType::Vf82599 {
            for _ in 0..IXGBE_82599_LINK_DEBOUNCE_READS {
                if links_reg & IXGBE_LINKS_UP == 0 {
                    break;
                }
                self.delay.udelay(IXGBE_82599_LINK_DEBOUNCE_US);
                links_reg = self.regs.read(IXGBE_VFLINKS);
            }
        }
        if self.regs.is_removed() {
            self.link = LinkStatus::DOWN;
            return Err(VfError::DeviceRemoved);
        }

        self.link = decode_links(links_reg, self.mac_type);
        Ok(self.link)
    }

    /// Only the permanent address can be "set", since nobody could install another one.
    pub fn hv_set_rar(&mut self, addr: [u8; IXGBE_ETH_LENGTH_OF_ADDRESS]) -> VfResult<()> {
        if addr != self.perm_addr {
            return Err(VfError::NotSupported);
        }
        self.addr = addr;
        Ok(())
    }

    /// Limits received frames to `max_frame_size` (plus CRC) through RXDCTL of queue 0.
    pub fn hv_set_rlpml(&mut self, max_frame_size: u32) -> VfResult<()> {
        let rlpml = (max_frame_size + IXGBE_HV_CRC_LEN) & IXGBE_RXDCTL_RLPMLMASK;
        let rxdctl = self.regs.read(ixgbe_vfrxdctl(0)) & !IXGBE_RXDCTL_RLPMLMASK;
        self.regs.write(ixgbe_vfrxdctl(0), rxdctl | rlpml | IXGBE_RXDCTL_RLPML_EN);
        Ok(())
    }

    /// Hyper-V speaks API 1.0 and nothing else.
    pub fn hv_negotiate_api_version(&mut self, api: ApiVersion) -> VfResult<()> {
        if api != ApiVersion::V1_0 {
            return Err(VfError::Nacked);
        }
        self.api_version = api;
        Ok(())
    }
}

//! Link state as seen by the VF, decoded from VFLINKS.

use crate::config::Delay;
use crate::error::{VfError, VfResult};
use crate::hw::{MacType, VfHw};
use crate::regs::*;

/// Link speeds, with the values of the `ixgbe_link_speed` bitmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LinkSpeedMbps {
    LS10    = 0x0002,
    LS100   = 0x0008,
    LS1000  = 0x0020,
    LS10000 = 0x0080,
    LS2500  = 0x0400,
    LS5000  = 0x0800,
}

impl LinkSpeedMbps {
    pub fn mbps(self) -> u32 {
        match self {
            LinkSpeedMbps::LS10 => 10,
            LinkSpeedMbps::LS100 => 100,
            LinkSpeedMbps::LS1000 => 1000,
            LinkSpeedMbps::LS2500 => 2500,
            LinkSpeedMbps::LS5000 => 5000,
            LinkSpeedMbps::LS10000 => 10000,
        }
    }
}

/// The link as reported by the VF's copy of the LINKS register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStatus {
    pub up: bool,
    /// `None` if the speed field holds a pattern this generation doesn't define.
    pub speed: Option<LinkSpeedMbps>,
}

impl LinkStatus {
    pub const DOWN: LinkStatus = LinkStatus { up: false, speed: None };

    /// The speed as an `ixgbe_link_speed` bitmask, 0 when unknown.
    pub fn speed_bits(&self) -> u32 {
        self.speed.map_or(0, |speed| speed as u32)
    }
}

impl Default for LinkStatus {
    fn default() -> LinkStatus {
        LinkStatus::DOWN
    }
}

/// Decodes a VFLINKS value.
///
/// X550 parts reuse the speed patterns: the non-standard bit turns 10G into 2.5G
/// (and 100M into 5G on the X550 itself), and the 00 pattern means 10M.
/// On older parts 00 is undefined and the speed is left unknown.
pub fn decode_links(links_reg: u32, mac_type: MacType) -> LinkStatus {
    let up = links_reg & IXGBE_LINKS_UP != 0;
    let non_std = links_reg & IXGBE_LINKS_SPEED_NON_STD != 0;

    let speed = match links_reg & IXGBE_LINKS_SPEED_82599 {
        IXGBE_LINKS_SPEED_10G_82599 => {
            if mac_type >= MacType::X550Vf && non_std {
                Some(LinkSpeedMbps::LS2500)
            } else {
                Some(LinkSpeedMbps::LS10000)
            }
        }
        IXGBE_LINKS_SPEED_1G_82599 => Some(LinkSpeedMbps::LS1000),
        IXGBE_LINKS_SPEED_100_82599 => {
            if mac_type == MacType::X550Vf && non_std {
                Some(LinkSpeedMbps::LS5000)
            } else {
                Some(LinkSpeedMbps::LS100)
            }
        }
        _ if mac_type >= MacType::X550Vf => Some(LinkSpeedMbps::LS10),
        _ => None,
    };

    LinkStatus { up, speed }
}

impl<R: RegisterAccess, D: Delay> VfHw<R, D> {
    /// Reads the current link state and caches it.
    ///
    /// While the PF is resetting us the link is reported down with
    /// [`VfError::ResetInProgress`], which callers must not confuse with a link that is just down.
    /// A removed device reads as all ones, reset bits included, so it is
    /// reported as [`VfError::DeviceRemoved`] instead.
    pub fn check_mac_link(&mut self) -> VfResult<LinkStatus> {
        if self.regs.is_removed() {
            self.link = LinkStatus::DOWN;
            return Err(VfError::DeviceRemoved);
        }
        if self.mbx.check_for_rst(&mut self.regs) {
            self.link = LinkStatus::DOWN;
            return if self.regs.is_removed() {
                Err(VfError::DeviceRemoved)
            } else {
                Err(VfError::ResetInProgress)
            };
        }

        let links_reg = self.regs.read(IXGBE_VFLINKS);
        if self.regs.is_removed() {
            self.link = LinkStatus::DOWN;
            return Err(VfError::DeviceRemoved);
        }
        let status = decode_links(links_reg, self.mac_type);
        if status.up && status.speed.is_none() {
            debug!("ixgbevf: link up with unknown speed, VFLINKS {:#010X}", links_reg);
        }
        self.link = status;
        Ok(status)
    }
}

//! The per-generation VF interface and device probing.
//!
//! All generations share the mailbox protocol implemented by [`VfHw`]. They differ in how
//! receive side scaling is configured: 82599 and X540 VFs ask the PF for its RSS key and
//! redirection table, while X550 VFs program their own RSS registers.
//! VFs passed through by Hyper-V have no PF on the mailbox and get their own implementation.

use alloc::boxed::Box;
use alloc::vec::Vec;
use spin::Mutex;

use crate::config::*;
use crate::error::{VfError, VfResult};
use crate::hv::PciConfigSpace;
use crate::hw::{MacType, VfHw};
use crate::link::LinkStatus;
use crate::msg::{ApiVersion, QueueConfig, XcastMode};
use crate::regs::RegisterAccess;

pub const INTEL_VEND:                   u16 = 0x8086;
/// 82599 virtual function
pub const IXGBE_DEV_ID_82599_VF:        u16 = 0x10ED;
/// X540 virtual function
pub const IXGBE_DEV_ID_X540_VF:         u16 = 0x1515;
/// X550 virtual function
pub const IXGBE_DEV_ID_X550_VF:         u16 = 0x1565;
/// X550EM_x virtual function
pub const IXGBE_DEV_ID_X550EM_X_VF:     u16 = 0x15A8;
/// X550EM_a virtual function
pub const IXGBE_DEV_ID_X550EM_A_VF:     u16 = 0x15C5;
/// 82599 virtual function under Hyper-V
pub const IXGBE_DEV_ID_82599_VF_HV:     u16 = 0x152E;
/// X540 virtual function under Hyper-V
pub const IXGBE_DEV_ID_X540_VF_HV:      u16 = 0x1530;
/// X550 virtual function under Hyper-V
pub const IXGBE_DEV_ID_X550_VF_HV:      u16 = 0x1564;
/// X550EM_x virtual function under Hyper-V
pub const IXGBE_DEV_ID_X550EM_X_VF_HV:  u16 = 0x15A9;
/// X550EM_a virtual function under Hyper-V
pub const IXGBE_DEV_ID_X550EM_A_VF_HV:  u16 = 0x15B4;

/// A probed VF behind a lock, for drivers that share it between tasks.
pub type LockedVf<R, D> = Mutex<Box<dyn VirtualFunction<Io = R, Clock = D> + Send>>;

/// Operations every VF generation offers.
///
/// Everything except RSS goes through the shared [`VfHw`] of the implementor.
pub trait VirtualFunction {
    type Io: RegisterAccess;
    type Clock: Delay;

    fn hw(&self) -> &VfHw<Self::Io, Self::Clock>;
    fn hw_mut(&mut self) -> &mut VfHw<Self::Io, Self::Clock>;

    /// The PCI device id this VF was probed with.
    fn device_id(&self) -> u16;

    /// The RSS hash key in use.
    fn get_rss_key(&mut self) -> VfResult<[u8; IXGBEVF_RSS_HASH_KEY_SIZE]>;

    /// The RSS redirection table in use, for `num_rx_queues` receive queues.
    fn get_reta(&mut self, num_rx_queues: u16) -> VfResult<Vec<u8>>;

    fn mac_type(&self) -> MacType {
        self.hw().mac_type()
    }

    fn reset(&mut self) -> VfResult<()> {
        self.hw_mut().reset_hw()
    }

    fn start(&mut self) {
        self.hw_mut().start_hw()
    }

    fn init(&mut self) {
        self.hw_mut().init_hw()
    }

    fn stop(&mut self) {
        self.hw_mut().stop_adapter()
    }

    fn set_mac_addr(&mut self, addr: [u8; IXGBE_ETH_LENGTH_OF_ADDRESS]) -> VfResult<()> {
        self.hw_mut().set_rar(addr)
    }

    fn set_uc_addr(&mut self, index: u8, addr: Option<[u8; IXGBE_ETH_LENGTH_OF_ADDRESS]>) -> VfResult<()> {
        self.hw_mut().set_uc_addr(index, addr)
    }

    fn set_vlan(&mut self, vlan: u32, vlan_on: bool) -> VfResult<()> {
        self.hw_mut().set_vfta(vlan, vlan_on)
    }

    fn update_multicast(&mut self, mc_addrs: &[[u8; IXGBE_ETH_LENGTH_OF_ADDRESS]]) -> VfResult<()> {
        self.hw_mut().update_mc_addr_list(mc_addrs)
    }

    fn set_rlpml(&mut self, max_frame_size: u32) -> VfResult<()> {
        self.hw_mut().set_rlpml(max_frame_size)
    }

    fn update_xcast_mode(&mut self, mode: XcastMode) -> VfResult<()> {
        self.hw_mut().update_xcast_mode(mode)
    }

    fn negotiate_api(&mut self) -> VfResult<ApiVersion> {
        self.hw_mut().negotiate_api()
    }

    fn get_queues(&mut self) -> VfResult<QueueConfig> {
        self.hw_mut().get_queues()
    }

    fn check_link(&mut self) -> VfResult<LinkStatus> {
        self.hw_mut().check_mac_link()
    }

    /// The operational MAC address.
    fn mac_addr(&self) -> [u8; IXGBE_ETH_LENGTH_OF_ADDRESS] {
        self.hw().mac_addr()
    }

    fn perm_addr(&self) -> [u8; IXGBE_ETH_LENGTH_OF_ADDRESS] {
        self.hw().perm_addr()
    }

    /// The usual bring-up sequence: reset, init, API negotiation and the queue query.
    fn bring_up(&mut self) -> VfResult<QueueConfig> {
        self.reset()?;
        self.init();
        self.negotiate_api()?;
        self.get_queues()
    }
}


/// A VF of an 82599 or X540 PF.
pub struct Ixgbe82599Vf<R, D> {
    hw: VfHw<R, D>,
    device_id: u16,
}

impl<R: RegisterAccess, D: Delay> Ixgbe82599Vf<R, D> {
    pub fn new(device_id: u16, io: R, delay: D, config: VfConfig) -> VfResult<Ixgbe82599Vf<R, D>> {
        let mac_type = match device_id {
            IXGBE_DEV_ID_82599_VF => MacType::Vf82599,
            IXGBE_DEV_ID_X540_VF => MacType::X540Vf,
            _ => return Err(VfError::NotSupported),
        };
        Ok(Ixgbe82599Vf { hw: VfHw::new(io, delay, mac_type, config), device_id })
    }
}

impl<R: RegisterAccess, D: Delay> VirtualFunction for Ixgbe82599Vf<R, D> {
    type Io = R;
    type Clock = D;

    fn hw(&self) -> &VfHw<R, D> {
        &self.hw
    }

    fn hw_mut(&mut self) -> &mut VfHw<R, D> {
        &mut self.hw
    }

    fn device_id(&self) -> u16 {
        self.device_id
    }

    fn get_rss_key(&mut self) -> VfResult<[u8; IXGBEVF_RSS_HASH_KEY_SIZE]> {
        self.hw.query_rss_key()
    }

    fn get_reta(&mut self, num_rx_queues: u16) -> VfResult<Vec<u8>> {
        self.hw.query_reta(num_rx_queues)
    }
}


/// A VF of an X550-family PF.
pub struct IxgbeX550Vf<R, D> {
    hw: VfHw<R, D>,
    device_id: u16,
}

impl<R: RegisterAccess, D: Delay> IxgbeX550Vf<R, D> {
    pub fn new(device_id: u16, io: R, delay: D, config: VfConfig) -> VfResult<IxgbeX550Vf<R, D>> {
        let mac_type = match device_id {
            IXGBE_DEV_ID_X550_VF => MacType::X550Vf,
            IXGBE_DEV_ID_X550EM_X_VF => MacType::X550EmXVf,
            IXGBE_DEV_ID_X550EM_A_VF => MacType::X550EmAVf,
            _ => return Err(VfError::NotSupported),
        };
        Ok(IxgbeX550Vf { hw: VfHw::new(io, delay, mac_type, config), device_id })
    }

    /// Programs the RSS key and spreads the redirection table over `num_rx_queues`.
    pub fn configure_rss(&mut self, key: &[u8; IXGBEVF_RSS_HASH_KEY_SIZE], num_rx_queues: u16) -> VfResult<()> {
        self.hw.configure_rss(key, num_rx_queues)
    }
}

impl<R: RegisterAccess, D: Delay> VirtualFunction for IxgbeX550Vf<R, D> {
    type Io = R;
    type Clock = D;

    fn hw(&self) -> &VfHw<R, D> {
        &self.hw
    }

    fn hw_mut(&mut self) -> &mut VfHw<R, D> {
        &mut self.hw
    }

    fn device_id(&self) -> u16 {
        self.device_id
    }

    fn get_rss_key(&mut self) -> VfResult<[u8; IXGBEVF_RSS_HASH_KEY_SIZE]> {
        Ok(self.hw.rss_key())
    }

    /// The table last written by `configure_rss()`; the queue count was fixed back then.
    fn get_reta(&mut self, _num_rx_queues: u16) -> VfResult<Vec<u8>> {
        Ok(self.hw.reta().to_vec())
    }
}


/// A VF passed through by Hyper-V, of any generation.
///
/// The permanent address comes from PCI config space and the API is fixed at 1.0,
/// so every request that would need a PF is `NotSupported`.
pub struct IxgbeHvVf<R, D, P> {
    hw: VfHw<R, D>,
    pci: P,
    device_id: u16,
}

impl<R: RegisterAccess, D: Delay, P: PciConfigSpace> IxgbeHvVf<R, D, P> {
    pub fn new(device_id: u16, io: R, pci: P, delay: D, config: VfConfig) -> VfResult<IxgbeHvVf<R, D, P>> {
        let mac_type = match device_id {
            IXGBE_DEV_ID_82599_VF_HV => MacType::Vf82599,
            IXGBE_DEV_ID_X540_VF_HV => MacType::X540Vf,
            IXGBE_DEV_ID_X550_VF_HV => MacType::X550Vf,
            IXGBE_DEV_ID_X550EM_X_VF_HV => MacType::X550EmXVf,
            IXGBE_DEV_ID_X550EM_A_VF_HV => MacType::X550EmAVf,
            _ => return Err(VfError::NotSupported),
        };
        Ok(IxgbeHvVf { hw: VfHw::new(io, delay, mac_type, config), pci, device_id })
    }

    /// Programs the RSS registers of an X550-class VF.
    pub fn configure_rss(&mut self, key: &[u8; IXGBEVF_RSS_HASH_KEY_SIZE], num_rx_queues: u16) -> VfResult<()> {
        self.hw.configure_rss(key, num_rx_queues)
    }
}

impl<R: RegisterAccess, D: Delay, P: PciConfigSpace> VirtualFunction for IxgbeHvVf<R, D, P> {
    type Io = R;
    type Clock = D;

    fn hw(&self) -> &VfHw<R, D> {
        &self.hw
    }

    fn hw_mut(&mut self) -> &mut VfHw<R, D> {
        &mut self.hw
    }

    fn device_id(&self) -> u16 {
        self.device_id
    }

    /// X550-class parts report what `configure_rss()` programmed; older ones would
    /// have to ask a PF, which API 1.0 doesn't allow.
    fn get_rss_key(&mut self) -> VfResult<[u8; IXGBEVF_RSS_HASH_KEY_SIZE]> {
        if self.hw.mac_type() >= MacType::X550Vf {
            Ok(self.hw.rss_key())
        } else {
            self.hw.query_rss_key()
        }
    }

    fn get_reta(&mut self, num_rx_queues: u16) -> VfResult<Vec<u8>> {
        if self.hw.mac_type() >= MacType::X550Vf {
            Ok(self.hw.reta().to_vec())
        } else {
            self.hw.query_reta(num_rx_queues)
        }
    }

    fn reset(&mut self) -> VfResult<()> {
        self.hw.hv_reset_hw(&self.pci)
    }

    fn set_mac_addr(&mut self, addr: [u8; IXGBE_ETH_LENGTH_OF_ADDRESS]) -> VfResult<()> {
        self.hw.hv_set_rar(addr)
    }

    fn set_uc_addr(&mut self, _index: u8, _addr: Option<[u8; IXGBE_ETH_LENGTH_OF_ADDRESS]>) -> VfResult<()> {
        Err(VfError::NotSupported)
    }

    fn set_vlan(&mut self, _vlan: u32, _vlan_on: bool) -> VfResult<()> {
        Err(VfError::NotSupported)
    }

    fn update_multicast(&mut self, _mc_addrs: &[[u8; IXGBE_ETH_LENGTH_OF_ADDRESS]]) -> VfResult<()> {
        Err(VfError::NotSupported)
    }

    fn set_rlpml(&mut self, max_frame_size: u32) -> VfResult<()> {
        self.hw.hv_set_rlpml(max_frame_size)
    }

    fn update_xcast_mode(&mut self, _mode: XcastMode) -> VfResult<()> {
        Err(VfError::NotSupported)
    }

    fn negotiate_api(&mut self) -> VfResult<ApiVersion> {
        self.hw.hv_negotiate_api_version(ApiVersion::V1_0)?;
        Ok(ApiVersion::V1_0)
    }

    fn check_link(&mut self) -> VfResult<LinkStatus> {
        self.hw.hv_check_mac_link()
    }
}


/// Creates the VF implementation matching `device_id`.
///
/// `pci` is the VF's configuration space; only Hyper-V VFs keep it.
/// Returns [`VfError::NotSupported`] for devices that are not ixgbe virtual functions.
pub fn probe<R, D, P>(device_id: u16, io: R, pci: P, delay: D, config: VfConfig)
    -> VfResult<Box<dyn VirtualFunction<Io = R, Clock = D> + Send>>
where
    R: RegisterAccess + Send + 'static,
    D: Delay + Send + 'static,
    P: PciConfigSpace + Send + 'static,
{
    match device_id {
        IXGBE_DEV_ID_82599_VF | IXGBE_DEV_ID_X540_VF => {
            Ok(Box::new(Ixgbe82599Vf::new(device_id, io, delay, config)?))
        }
        IXGBE_DEV_ID_X550_VF | IXGBE_DEV_ID_X550EM_X_VF | IXGBE_DEV_ID_X550EM_A_VF => {
            Ok(Box::new(IxgbeX550Vf::new(device_id, io, delay, config)?))
        }
        IXGBE_DEV_ID_82599_VF_HV
        | IXGBE_DEV_ID_X540_VF_HV
        | IXGBE_DEV_ID_X550_VF_HV
        | IXGBE_DEV_ID_X550EM_X_VF_HV
        | IXGBE_DEV_ID_X550EM_A_VF_HV => {
            Ok(Box::new(IxgbeHvVf::new(device_id, io, pci, delay, config)?))
        }
        _ => {
            warn!("ixgbevf: device id {:#06X} is not a supported virtual function", device_id);
            Err(VfError::NotSupported)
        }
    }
}

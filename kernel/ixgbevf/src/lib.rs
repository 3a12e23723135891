//! The core of a driver for virtual functions (VFs) of Intel 82599, X540 and X550 10 GbE NICs.
//!
//! Under SR-IOV a VF only sees a small register window; its MAC address, multicast and VLAN filters,
//! frame size and (before X550) RSS configuration are owned by the physical function (PF) driver.
//! The VF asks for all of these through a mailbox: a 16-word buffer shared with the PF
//! plus a control register for signalling.
//!
//! This crate implements:
//! * access to the VF register window ([`regs`]),
//! * the mailbox transport ([`mailbox`]) and the messages sent over it ([`msg`]),
//! * the reset handshake and every PF request on a per-VF handle ([`VfHw`]),
//! * link state decoding ([`link`]),
//! * the per-generation [`VirtualFunction`] interface, chosen by [`probe()`],
//!   including VFs passed through by Hyper-V ([`hv`]).
//!
//! Descriptor rings and interrupt handling are left to the driver that embeds this crate.
//! Timing is injected through the [`Delay`] trait, so every wait is bounded by a [`RetryPolicy`].

#![cfg_attr(not(test), no_std)]

#[macro_use] extern crate log;
extern crate alloc;
extern crate bit_field;
extern crate bitflags;
extern crate num_enum;
extern crate spin;
extern crate volatile;
extern crate zerocopy;

pub mod config;
pub mod error;
pub mod regs;
pub mod msg;
pub mod mailbox;
pub mod hw;
pub mod link;
pub mod hv;
mod rss;
pub mod virtual_function;

#[cfg(test)]
mod fake_pf;

pub use config::{Delay, RetryPolicy, VfConfig};
pub use error::{VfError, VfResult};
pub use hv::PciConfigSpace;
pub use hw::{MacType, VfHw, VfState};
pub use link::{LinkSpeedMbps, LinkStatus};
pub use regs::{MmioRegisters, RegisterAccess, VfRegisters};
pub use virtual_function::{probe, Ixgbe82599Vf, IxgbeHvVf, IxgbeX550Vf, LockedVf, VirtualFunction};

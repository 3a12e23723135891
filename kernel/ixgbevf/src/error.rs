//! Errors returned by the VF driver.

use core::fmt;

/// Possible reasons for failure of a VF operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VfError {
    /// The PF never acknowledged our message or never posted a reply,
    /// or the mailbox has not been armed by a reset yet.
    TransportTimeout,
    /// The VFU bit could not be obtained, so the PF still owns the mailbox buffer.
    MailboxBusy,
    /// The reply header does not match the request it answers.
    ProtocolMismatch { expected: u32, received: u32 },
    /// The PF explicitly rejected the request.
    Nacked,
    /// The PF refused a query with a failure reply.
    PermissionDenied,
    /// The negotiated API version or the device generation does not offer this operation.
    NotSupported,
    /// Registers read as all ones: the device is gone.
    DeviceRemoved,
    /// The PF reset indication never cleared after a function level reset.
    ResetTimeout,
    /// The PF is currently resetting this VF.
    ResetInProgress,
    /// The reset reply did not carry a valid permanent MAC address.
    InvalidMacAddress,
    /// The PF has no filter left for an additional unicast address.
    OutOfResources,
}

pub type VfResult<T> = Result<T, VfError>;

impl From<VfError> for &'static str {
    fn from(error: VfError) -> Self {
        match error {
            VfError::TransportTimeout => "mailbox timed out waiting for the PF",
            VfError::MailboxBusy => "could not obtain the mailbox lock",
            VfError::ProtocolMismatch { .. } => "mailbox reply does not match the request",
            VfError::Nacked => "request was rejected by the PF",
            VfError::PermissionDenied => "PF denied the request",
            VfError::NotSupported => "operation not supported by this API version or device",
            VfError::DeviceRemoved => "device has been removed",
            VfError::ResetTimeout => "reset indication did not clear",
            VfError::ResetInProgress => "PF reset in progress",
            VfError::InvalidMacAddress => "PF did not provide a valid MAC address",
            VfError::OutOfResources => "PF is out of unicast filters",
        }
    }
}

impl fmt::Display for VfError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            VfError::ProtocolMismatch { expected, received } => write!(
                f, "mailbox reply does not match the request: expected {:#010X}, received {:#010X}",
                expected, received
            ),
            other => f.write_str(<&'static str>::from(*other)),
        }
    }
}

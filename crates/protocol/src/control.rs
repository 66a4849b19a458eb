//! Class control requests on the modem interface

use std::time::Duration;

/// CDC SET_CONTROL_LINE_STATE
pub const SET_CONTROL_LINE_STATE: u8 = 0x22;

/// Class request, interface recipient, host to device
pub const CLASS_INTERFACE_OUT: u8 = 0x21;

/// Timeout for control requests (5 seconds)
pub const CONTROL_TIMEOUT: Duration = Duration::from_secs(5);

/// A control request without a data stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlRequest {
    pub request_type: u8,
    pub request: u8,
    pub value: u16,
    pub index: u16,
    pub timeout: Duration,
}

impl ControlRequest {
    /// Raise or drop DTR on the given interface
    pub fn set_dtr(on: bool, interface: u8) -> Self {
        Self {
            request_type: CLASS_INTERFACE_OUT,
            request: SET_CONTROL_LINE_STATE,
            value: u16::from(on),
            index: u16::from(interface),
            timeout: CONTROL_TIMEOUT,
        }
    }

    /// Bit 7 of bmRequestType clear means host to device
    pub fn is_out(&self) -> bool {
        (self.request_type & 0x80) == 0
    }
}

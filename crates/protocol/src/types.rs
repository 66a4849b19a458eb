//! Transfer-level type definitions
//!
//! Logical channels of the link, transfer directions, the status a transport
//! reports when a transfer finishes, and transport error conditions.

use std::fmt;

/// Logical data path to the device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Outbound bulk endpoint (host to device)
    BulkOut,
    /// Inbound bulk endpoint (device to host)
    BulkIn,
    /// Inbound interrupt endpoint carrying status notifications
    Interrupt,
}

impl Channel {
    /// All channels, in the order they are torn down on close
    pub const ALL: [Channel; 3] = [Channel::BulkOut, Channel::BulkIn, Channel::Interrupt];

    /// Direction of every transfer on this channel
    pub fn direction(self) -> Direction {
        match self {
            Channel::BulkOut => Direction::Out,
            Channel::BulkIn | Channel::Interrupt => Direction::In,
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Channel::BulkOut => "bulk-out",
            Channel::BulkIn => "bulk-in",
            Channel::Interrupt => "interrupt",
        };
        f.write_str(name)
    }
}

/// Transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    In,
    Out,
}

/// USB error types
///
/// Maps to libusb error codes. See rusb::Error for details.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsbError {
    /// Transfer timed out
    #[error("transfer timed out")]
    Timeout,
    /// Endpoint stalled (protocol error)
    #[error("endpoint stalled")]
    Pipe,
    /// Device was disconnected
    #[error("device disconnected")]
    NoDevice,
    /// Device or endpoint not found
    #[error("device or endpoint not found")]
    NotFound,
    /// Device is busy
    #[error("device busy")]
    Busy,
    /// Buffer overflow
    #[error("buffer overflow")]
    Overflow,
    /// I/O error
    #[error("I/O error")]
    Io,
    /// Invalid parameter
    #[error("invalid parameter")]
    InvalidParam,
    /// Access denied (permissions)
    #[error("access denied")]
    Access,
    /// Other error with message
    #[error("{message}")]
    Other { message: String },
}

/// Completion status reported by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    /// Transfer finished and its data is valid
    Completed,
    /// Transfer was cancelled by `cancel_all`
    Cancelled,
    /// Transport is going away (device removed, endpoint torn down)
    Shutdown,
    /// Transfer failed; the channel itself is still usable
    Failed(UsbError),
}

impl TransferStatus {
    /// True when the link is tearing down and the transfer must not be resubmitted
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Cancelled
                | TransferStatus::Shutdown
                | TransferStatus::Failed(UsbError::NoDevice)
        )
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TransferStatus::Completed)
    }
}

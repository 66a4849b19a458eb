//! Transport boundary
//!
//! The link consumes a packetized, callback-driven transport. Submitting a
//! transfer moves it into the transport; the transport moves it back through
//! [`CompletionHandler::complete`] when it finishes, is cancelled, or the
//! device goes away.

use crate::transfer::Transfer;
use protocol::{Channel, ControlRequest, TransferStatus, UsbError};
use std::fmt;
use std::sync::Weak;

/// Receiver of finished transfers (the completion context)
///
/// Implementations are invoked from whatever thread the transport completes
/// on and must return in bounded time: no sink I/O, no blocking waits.
pub trait CompletionHandler: Send + Sync {
    fn complete(&self, transfer: Transfer, status: TransferStatus);
}

/// A submission the transport refused, with the transfer handed back
pub struct Rejected {
    pub transfer: Transfer,
    pub error: UsbError,
}

impl Rejected {
    pub fn new(transfer: Transfer, error: UsbError) -> Self {
        Self { transfer, error }
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("transfer", &self.transfer.id())
            .field("error", &self.error)
            .finish()
    }
}

/// Packetized transport with one outbound bulk, one inbound bulk and one
/// interrupt channel
///
/// Transfers on a channel complete in submission order. Implementations must
/// not call the completion handler from inside `submit`.
pub trait Transport: Send + Sync {
    /// Register the handler that receives every completion
    fn bind(&self, handler: Weak<dyn CompletionHandler>);

    /// Queue a transfer on its channel
    fn submit(&self, transfer: Transfer) -> Result<(), Rejected>;

    /// Cancel everything queued or running on `channel`
    ///
    /// Cancelled transfers are completed with [`TransferStatus::Cancelled`]
    /// before this returns; afterwards nothing on the channel is in flight.
    fn cancel_all(&self, channel: Channel);

    /// Send a control request without a data stage
    fn control_out(&self, request: &ControlRequest) -> Result<(), UsbError>;
}

//! Interrupt channel and modem-status decoding
//!
//! The interrupt channel behaves like a read pool of one: a single transfer
//! that is resubmitted after every notification while the link is open.

use crate::error::LinkError;
use crate::sync::lock;
use crate::transfer::Transfer;
use crate::transport::{Rejected, Transport};
use protocol::{Channel, LineState, ModemStatus, Notification, NotificationError};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU16, Ordering};
use tracing::{debug, error};

/// Current modem control-line status of an open link
///
/// Written only by the completion context (through [`StatusDecoder`]) and by
/// open/close; read from anywhere. The whole mask is one atomic word, so a
/// reader may see a stale value but never a torn one.
#[derive(Debug, Default)]
pub struct ControlStatus {
    bits: AtomicU16,
}

impl ControlStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ModemStatus {
        ModemStatus::from_bits_retain(self.bits.load(Ordering::Acquire))
    }

    pub fn reset(&self) {
        self.bits.store(0, Ordering::Release);
    }

    /// Fold a line-state byte into the mask; single writer only
    pub(crate) fn apply(&self, line: LineState) -> ModemStatus {
        let next = self.snapshot().apply_line_state(line);
        self.bits.store(next.bits(), Ordering::Release);
        next
    }
}

/// Turns interrupt notifications into status updates
#[derive(Debug, Clone, Copy)]
pub struct StatusDecoder {
    port_number: u8,
    control_port: bool,
}

impl StatusDecoder {
    pub fn new(port_number: u8, control_port: bool) -> Self {
        Self {
            port_number,
            control_port,
        }
    }

    /// Process one notification payload
    ///
    /// Only a well-formed modem-status notification on the control port
    /// changes `status`. Everything else is logged and ignored.
    pub fn decode(&self, status: &ControlStatus, payload: &[u8]) -> Option<Notification> {
        match Notification::parse(payload) {
            Ok(notification @ Notification::ModemStatus(line)) => {
                if !self.control_port {
                    debug!(
                        "Modem status on port {} ignored, not the modem port",
                        self.port_number
                    );
                    return Some(notification);
                }
                let now = status.apply(line);
                debug!("Modem status now {:#x}", now.bits());
                Some(notification)
            }
            Ok(notification @ Notification::ResponseAvailable) => {
                debug!("Response available");
                Some(notification)
            }
            Ok(notification @ Notification::SpeedChange) => {
                debug!("Speed change");
                Some(notification)
            }
            Err(e @ NotificationError::ModemStatusTooShort { .. }) => {
                error!("Port {}: {}", self.port_number, e);
                None
            }
            Err(e) => {
                debug!("Port {}: {}", self.port_number, e);
                None
            }
        }
    }
}

/// The single interrupt transfer and where it currently is
pub struct InterruptSlot {
    parked: Mutex<Option<Transfer>>,
    in_flight: AtomicBool,
    buffer_size: usize,
}

impl InterruptSlot {
    pub fn new(buffer_size: usize) -> Self {
        Self {
            parked: Mutex::new(Some(Transfer::new(Channel::Interrupt, 0, buffer_size))),
            in_flight: AtomicBool::new(false),
            buffer_size,
        }
    }

    pub fn owns(&self, transfer: &Transfer) -> bool {
        transfer.channel() == Channel::Interrupt
            && transfer.slot() == 0
            && transfer.capacity() == self.buffer_size
    }

    pub fn take(&self) -> Option<Transfer> {
        lock(&self.parked).take()
    }

    pub fn park(&self, transfer: Transfer) {
        *lock(&self.parked) = Some(transfer);
    }

    /// Hand the interrupt transfer to the transport; parked again if refused
    pub fn submit(&self, transport: &dyn Transport, mut transfer: Transfer) -> Result<(), LinkError> {
        transfer.set_actual_length(0);
        self.in_flight.store(true, Ordering::Release);
        match transport.submit(transfer) {
            Ok(()) => Ok(()),
            Err(Rejected { transfer, error }) => {
                self.in_flight.store(false, Ordering::Release);
                self.park(transfer);
                Err(LinkError::Submit {
                    channel: Channel::Interrupt,
                    error,
                })
            }
        }
    }

    /// The transfer came back from the transport
    pub fn landed(&self) -> bool {
        self.in_flight.swap(false, Ordering::AcqRel)
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn is_parked(&self) -> bool {
        lock(&self.parked).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{modem_status_notification, raw_notification, truncated_modem_status};

    #[test]
    fn test_modem_status_sets_carrier() {
        let status = ControlStatus::new();
        let decoder = StatusDecoder::new(4, true);

        decoder.decode(&status, &modem_status_notification(LineState::CARRIER));

        let snapshot = status.snapshot();
        assert!(snapshot.contains(ModemStatus::CAR));
        assert!(!snapshot.contains(ModemStatus::DSR));
        assert!(!snapshot.contains(ModemStatus::RNG));
    }

    #[test]
    fn test_short_modem_status_leaves_state() {
        let status = ControlStatus::new();
        let decoder = StatusDecoder::new(4, true);
        decoder.decode(&status, &modem_status_notification(LineState::DSR));

        let result = decoder.decode(&status, &truncated_modem_status(LineState::CARRIER, 7));

        assert!(result.is_none());
        assert_eq!(status.snapshot(), ModemStatus::DSR);
    }

    #[test]
    fn test_other_notifications_leave_state() {
        let status = ControlStatus::new();
        let decoder = StatusDecoder::new(4, true);
        decoder.decode(&status, &modem_status_notification(LineState::RING));

        assert_eq!(
            decoder.decode(&status, &raw_notification(0x01a1, 8)),
            Some(Notification::ResponseAvailable)
        );
        assert_eq!(
            decoder.decode(&status, &raw_notification(0x2aa1, 8)),
            Some(Notification::SpeedChange)
        );
        assert_eq!(decoder.decode(&status, &raw_notification(0xbeef, 9)), None);
        assert_eq!(decoder.decode(&status, &[0xa1]), None);

        assert_eq!(status.snapshot(), ModemStatus::RNG);
    }

    #[test]
    fn test_non_control_port_ignores_modem_status() {
        let status = ControlStatus::new();
        let decoder = StatusDecoder::new(1, false);

        decoder.decode(&status, &modem_status_notification(LineState::CARRIER));

        assert!(status.snapshot().is_empty());
    }

    #[test]
    fn test_reset() {
        let status = ControlStatus::new();
        status.apply(LineState::CARRIER | LineState::DSR);
        assert!(!status.snapshot().is_empty());

        status.reset();
        assert!(status.snapshot().is_empty());
    }

    #[test]
    fn test_interrupt_slot_take_and_park() {
        let slot = InterruptSlot::new(16);
        let transfer = slot.take().unwrap();
        assert!(slot.owns(&transfer));
        assert!(!slot.is_parked());

        slot.park(transfer);
        assert!(slot.is_parked());
        assert!(!slot.is_in_flight());
    }
}

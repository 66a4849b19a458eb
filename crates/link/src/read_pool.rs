//! Inbound transfer pool
//!
//! Every read transfer is always in exactly one place: submitted to the
//! transport (tracked in the in-flight set), waiting in the pending queue for
//! the drain worker, held by the drain worker, or parked in the pool. Parking
//! happens only while the link is closed, or when the transport refuses a
//! resubmission; while the link is open all [`POOL_SIZE`] transfers normally
//! cycle between the transport and the worker.

use crate::config::POOL_SIZE;
use crate::error::LinkError;
use crate::sync::lock;
use crate::transfer::{InFlightSet, Transfer, TransferId};
use crate::transport::{Rejected, Transport};
use protocol::Channel;
use std::collections::VecDeque;
use std::sync::Mutex;
use tracing::{debug, error};

pub struct ReadPool {
    parked: Mutex<Vec<Transfer>>,
    pending: Mutex<VecDeque<Transfer>>,
    in_flight: InFlightSet,
    buffer_size: usize,
}

impl ReadPool {
    pub fn new(buffer_size: usize) -> Self {
        let parked = (0..POOL_SIZE)
            .map(|slot| Transfer::new(Channel::BulkIn, slot, buffer_size))
            .collect();

        Self {
            parked: Mutex::new(parked),
            pending: Mutex::new(VecDeque::with_capacity(POOL_SIZE)),
            in_flight: InFlightSet::new(),
            buffer_size,
        }
    }

    /// True if `transfer` is one of this pool's read transfers
    pub fn owns(&self, transfer: &Transfer) -> bool {
        transfer.channel() == Channel::BulkIn
            && transfer.slot() < POOL_SIZE
            && transfer.capacity() == self.buffer_size
    }

    /// Hand a read transfer to the transport
    ///
    /// A refused transfer is parked and the error returned.
    pub fn submit(&self, transport: &dyn Transport, mut transfer: Transfer) -> Result<(), LinkError> {
        let id = transfer.id();
        transfer.set_actual_length(0);

        if !self.in_flight.insert(id.slot) {
            error!("Read transfer {} submitted while already in flight", id);
        }
        match transport.submit(transfer) {
            Ok(()) => Ok(()),
            Err(Rejected { transfer, error }) => {
                self.in_flight.remove(id.slot);
                self.park(transfer);
                Err(LinkError::Submit {
                    channel: Channel::BulkIn,
                    error,
                })
            }
        }
    }

    /// A transfer came back from the transport
    ///
    /// Returns `false` if it was not recorded as in flight.
    pub fn landed(&self, id: TransferId) -> bool {
        self.in_flight.remove(id.slot)
    }

    pub fn park(&self, transfer: Transfer) {
        lock(&self.parked).push(transfer);
    }

    pub fn take_parked(&self) -> Vec<Transfer> {
        std::mem::take(&mut *lock(&self.parked))
    }

    pub fn push_pending(&self, transfer: Transfer) {
        lock(&self.pending).push_back(transfer);
    }

    pub fn pop_pending(&self) -> Option<Transfer> {
        lock(&self.pending).pop_front()
    }

    /// Park everything still waiting for the drain worker, undrained
    ///
    /// Returns the number of transfers whose data was discarded.
    pub fn scuttle_pending(&self) -> usize {
        let scuttled: Vec<Transfer> = lock(&self.pending).drain(..).collect();
        let count = scuttled.len();
        if count > 0 {
            debug!("Dropping {} undrained read transfers", count);
            lock(&self.parked).extend(scuttled);
        }
        count
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn pending(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn parked(&self) -> usize {
        lock(&self.parked).len()
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockTransport;
    use protocol::UsbError;

    #[test]
    fn test_new_pool_is_fully_parked() {
        let pool = ReadPool::new(128);
        assert_eq!(pool.parked(), POOL_SIZE);
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_submit_tracks_in_flight() {
        let transport = MockTransport::new();
        let pool = ReadPool::new(128);

        for transfer in pool.take_parked() {
            pool.submit(&*transport, transfer).unwrap();
        }

        assert_eq!(pool.in_flight(), POOL_SIZE);
        assert_eq!(transport.in_flight(Channel::BulkIn), POOL_SIZE);
        assert_eq!(pool.parked(), 0);
    }

    #[test]
    fn test_rejected_submit_parks() {
        let transport = MockTransport::new();
        transport.reject_next(Channel::BulkIn, UsbError::Busy);
        let pool = ReadPool::new(128);
        let mut parked = pool.take_parked();
        let transfer = parked.pop().unwrap();

        assert!(pool.submit(&*transport, transfer).is_err());
        assert_eq!(pool.parked(), 1);
        assert_eq!(pool.in_flight(), 0);
    }

    #[test]
    fn test_scuttle_moves_pending_to_parked() {
        let pool = ReadPool::new(128);
        for transfer in pool.take_parked().into_iter().take(3) {
            pool.push_pending(transfer);
        }

        assert_eq!(pool.pending(), 3);
        assert_eq!(pool.scuttle_pending(), 3);
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.parked(), 3);
    }

    #[test]
    fn test_owns() {
        let pool = ReadPool::new(128);
        assert!(pool.owns(&Transfer::new(Channel::BulkIn, 0, 128)));
        assert!(!pool.owns(&Transfer::new(Channel::BulkIn, POOL_SIZE, 128)));
        assert!(!pool.owns(&Transfer::new(Channel::Interrupt, 0, 128)));
        assert!(!pool.owns(&Transfer::new(Channel::BulkIn, 0, 64)));
    }
}

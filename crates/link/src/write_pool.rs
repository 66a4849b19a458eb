//! Outbound transfer pool
//!
//! A fixed array of [`POOL_SIZE`] slots, each either free (the pool holds the
//! transfer) or busy (the producer or the transport holds it). The slot array
//! lock covers only the scan-and-claim in `acquire` and the hand-back in
//! `release`, so two producers can never claim the same slot.

use crate::config::POOL_SIZE;
use crate::error::LinkError;
use crate::sync::lock;
use crate::transfer::{InFlightSet, Transfer};
use crate::transport::{Rejected, Transport};
use protocol::Channel;
use std::sync::Mutex;
use tracing::{debug, error, trace, warn};

enum Slot {
    Free(Transfer),
    Busy,
}

pub struct WritePool {
    slots: Mutex<Vec<Slot>>,
    in_flight: InFlightSet,
    buffer_size: usize,
}

impl WritePool {
    pub fn new(buffer_size: usize) -> Self {
        let slots = (0..POOL_SIZE)
            .map(|slot| Slot::Free(Transfer::new(Channel::BulkOut, slot, buffer_size)))
            .collect();

        Self {
            slots: Mutex::new(slots),
            in_flight: InFlightSet::new(),
            buffer_size,
        }
    }

    /// Claim a free slot, or `None` when every slot is busy
    ///
    /// Never blocks; `None` is backpressure, not an error.
    pub fn acquire(&self) -> Option<Transfer> {
        let mut slots = lock(&self.slots);
        let slot = slots.iter_mut().find(|slot| matches!(slot, Slot::Free(_)))?;
        match std::mem::replace(slot, Slot::Busy) {
            Slot::Free(transfer) => Some(transfer),
            Slot::Busy => None,
        }
    }

    /// Return a transfer to its slot
    ///
    /// Transfers this pool does not recognise (wrong channel, slot out of
    /// range, slot not busy, foreign buffer) are logged and dropped.
    pub fn release(&self, transfer: Transfer) -> Result<(), LinkError> {
        let id = transfer.id();
        if id.channel != Channel::BulkOut
            || id.slot >= POOL_SIZE
            || transfer.capacity() != self.buffer_size
        {
            warn!("Release of unknown write transfer {}", id);
            return Err(LinkError::UnknownHandle(id));
        }

        self.in_flight.remove(id.slot);

        let mut slots = lock(&self.slots);
        match slots.get_mut(id.slot) {
            Some(slot) if matches!(slot, Slot::Busy) => {
                *slot = Slot::Free(transfer);
                Ok(())
            }
            _ => {
                warn!("Release of write transfer {} whose slot is not busy", id);
                Err(LinkError::UnknownHandle(id))
            }
        }
    }

    /// Copy up to one buffer of `bytes` into `transfer` and hand it to the transport
    ///
    /// Returns the number of bytes queued, which is less than `bytes.len()`
    /// when the write is larger than a buffer. On rejection the slot is freed
    /// immediately and the error is returned.
    pub fn submit(
        &self,
        transport: &dyn Transport,
        mut transfer: Transfer,
        bytes: &[u8],
        trace_data: bool,
    ) -> Result<usize, LinkError> {
        let count = transfer.fill(bytes);
        let id = transfer.id();
        if trace_data {
            trace!("{} out {} bytes: {:02x?}", id, count, transfer.data());
        }

        self.in_flight.insert(id.slot);
        match transport.submit(transfer) {
            Ok(()) => {
                debug!("Submitted write {} ({} of {} bytes)", id, count, bytes.len());
                Ok(count)
            }
            Err(Rejected { transfer, error }) => {
                error!("Submit of bulk write {} failed: {}", id, error);
                self.in_flight.remove(id.slot);
                if let Err(e) = self.release(transfer) {
                    debug!("Rejected write {} not returned to pool: {}", id, e);
                }
                Err(LinkError::Submit {
                    channel: Channel::BulkOut,
                    error,
                })
            }
        }
    }

    pub fn free_slots(&self) -> usize {
        lock(&self.slots)
            .iter()
            .filter(|slot| matches!(slot, Slot::Free(_)))
            .count()
    }

    /// Transfers currently owned by the transport
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
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
    fn test_acquire_until_exhausted() {
        let pool = WritePool::new(64);
        let held: Vec<_> = (0..POOL_SIZE).map(|_| pool.acquire().unwrap()).collect();

        assert_eq!(pool.free_slots(), 0);
        assert!(pool.acquire().is_none());

        let mut slots: Vec<_> = held.iter().map(Transfer::slot).collect();
        slots.sort_unstable();
        slots.dedup();
        assert_eq!(slots.len(), POOL_SIZE);
    }

    #[test]
    fn test_acquire_release_restores_free_count() {
        let pool = WritePool::new(64);
        let _a = pool.acquire().unwrap();
        let before = pool.free_slots();

        let b = pool.acquire().unwrap();
        pool.release(b).unwrap();

        assert_eq!(pool.free_slots(), before);
    }

    #[test]
    fn test_double_release_is_rejected() {
        let pool = WritePool::new(64);
        let transfer = pool.acquire().unwrap();
        let slot = transfer.slot();
        pool.release(transfer).unwrap();

        let forged = Transfer::new(Channel::BulkOut, slot, 64);
        assert!(matches!(
            pool.release(forged),
            Err(LinkError::UnknownHandle(_))
        ));
        assert_eq!(pool.free_slots(), POOL_SIZE);
    }

    #[test]
    fn test_release_foreign_transfer() {
        let pool = WritePool::new(64);
        let _busy = pool.acquire().unwrap();

        assert!(pool.release(Transfer::new(Channel::BulkIn, 0, 64)).is_err());
        assert!(pool.release(Transfer::new(Channel::BulkOut, POOL_SIZE, 64)).is_err());
        assert!(pool.release(Transfer::new(Channel::BulkOut, 0, 32)).is_err());
        assert_eq!(pool.free_slots(), POOL_SIZE - 1);
    }

    #[test]
    fn test_submit_truncates_to_buffer() {
        let transport = MockTransport::new();
        let pool = WritePool::new(8);
        let transfer = pool.acquire().unwrap();

        let count = pool
            .submit(&*transport, transfer, b"0123456789", false)
            .unwrap();

        assert_eq!(count, 8);
        assert_eq!(pool.in_flight(), 1);
        assert_eq!(transport.written(), vec![b"01234567".to_vec()]);
    }

    #[test]
    fn test_rejected_submit_frees_slot() {
        let transport = MockTransport::new();
        transport.reject_next(Channel::BulkOut, UsbError::Pipe);
        let pool = WritePool::new(8);
        let transfer = pool.acquire().unwrap();

        let result = pool.submit(&*transport, transfer, b"abc", false);

        assert!(matches!(
            result,
            Err(LinkError::Submit {
                channel: Channel::BulkOut,
                error: UsbError::Pipe
            })
        ));
        assert_eq!(pool.free_slots(), POOL_SIZE);
        assert_eq!(pool.in_flight(), 0);
    }
}

//! Transfer handles and in-flight bookkeeping
//!
//! A [`Transfer`] pairs one pool slot with its buffer. It is moved, never
//! shared: the pool, the producer, the transport and the drain worker each
//! hold it in turn, and the hand-off is the move itself.

use protocol::{Channel, Direction};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Identity of a transfer: its channel and slot index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId {
    pub channel: Channel,
    pub slot: usize,
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.channel, self.slot)
    }
}

/// One unit of I/O and the buffer it owns
pub struct Transfer {
    id: TransferId,
    buffer: Box<[u8]>,
    /// Bytes to send (OUT) or bytes received (IN)
    length: usize,
}

impl Transfer {
    pub(crate) fn new(channel: Channel, slot: usize, capacity: usize) -> Self {
        Self {
            id: TransferId { channel, slot },
            buffer: vec![0u8; capacity].into_boxed_slice(),
            length: 0,
        }
    }

    pub fn id(&self) -> TransferId {
        self.id
    }

    pub fn channel(&self) -> Channel {
        self.id.channel
    }

    pub fn slot(&self) -> usize {
        self.id.slot
    }

    pub fn direction(&self) -> Direction {
        self.id.channel.direction()
    }

    /// Size of the allocated buffer
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Valid bytes: the payload to send, or what the device returned
    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn data(&self) -> &[u8] {
        &self.buffer[..self.length]
    }

    /// Whole buffer, for transports filling an IN transfer
    pub fn buffer_mut(&mut self) -> &mut [u8] {
        &mut self.buffer
    }

    /// Record how many bytes the device actually returned (clamped to capacity)
    pub fn set_actual_length(&mut self, len: usize) {
        self.length = len.min(self.buffer.len());
    }

    /// Copy as much of `bytes` as fits; returns the count copied
    pub(crate) fn fill(&mut self, bytes: &[u8]) -> usize {
        let count = bytes.len().min(self.buffer.len());
        self.buffer[..count].copy_from_slice(&bytes[..count]);
        self.length = count;
        count
    }
}

impl fmt::Debug for Transfer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transfer")
            .field("id", &self.id)
            .field("capacity", &self.buffer.len())
            .field("length", &self.length)
            .finish()
    }
}

/// Slots of one channel currently owned by the transport
///
/// Membership is bookkeeping only; it never confers ownership of the
/// transfer. Backed by one atomic word so the completion context can update
/// it without taking a lock.
#[derive(Debug, Default)]
pub struct InFlightSet {
    bits: AtomicU32,
}

impl InFlightSet {
    /// Largest slot index the set can track
    pub const MAX_SLOTS: usize = 32;

    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the slot was already in flight
    pub fn insert(&self, slot: usize) -> bool {
        let mask = Self::mask(slot);
        self.bits.fetch_or(mask, Ordering::AcqRel) & mask == 0
    }

    /// Returns `false` if the slot was not in flight
    pub fn remove(&self, slot: usize) -> bool {
        let mask = Self::mask(slot);
        self.bits.fetch_and(!mask, Ordering::AcqRel) & mask != 0
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.bits.load(Ordering::Acquire) & Self::mask(slot) != 0
    }

    pub fn len(&self) -> usize {
        self.bits.load(Ordering::Acquire).count_ones() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.bits.load(Ordering::Acquire) == 0
    }

    fn mask(slot: usize) -> u32 {
        debug_assert!(slot < Self::MAX_SLOTS);
        1u32.checked_shl(slot as u32).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_truncates() {
        let mut transfer = Transfer::new(Channel::BulkOut, 3, 4);
        assert_eq!(transfer.fill(b"abcdef"), 4);
        assert_eq!(transfer.data(), b"abcd");
        assert_eq!(transfer.direction(), Direction::Out);
        assert_eq!(transfer.id().to_string(), "bulk-out#3");
    }

    #[test]
    fn test_actual_length_clamped() {
        let mut transfer = Transfer::new(Channel::BulkIn, 0, 8);
        transfer.buffer_mut()[..2].copy_from_slice(b"hi");
        transfer.set_actual_length(2);
        assert_eq!(transfer.data(), b"hi");

        transfer.set_actual_length(100);
        assert_eq!(transfer.len(), 8);
    }

    #[test]
    fn test_in_flight_set() {
        let set = InFlightSet::new();
        assert!(set.is_empty());

        assert!(set.insert(0));
        assert!(set.insert(15));
        assert!(!set.insert(15));
        assert_eq!(set.len(), 2);
        assert!(set.contains(15));

        assert!(set.remove(15));
        assert!(!set.remove(15));
        assert_eq!(set.len(), 1);
    }
}

//! In-memory transport and sink for exercising the link without hardware
//!
//! [`MockTransport`] holds submitted transfers per channel in submission
//! order and completes them only when a test asks it to, so every
//! interleaving a test needs can be driven by hand.

use crate::sink::Sink;
use crate::sync::lock;
use crate::transfer::{Transfer, TransferId};
use crate::transport::{CompletionHandler, Rejected, Transport};
use protocol::{Channel, ControlRequest, TransferStatus, UsbError};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, Weak};

#[derive(Default)]
struct MockState {
    queues: HashMap<Channel, VecDeque<Transfer>>,
    outstanding: HashSet<TransferId>,
    peak: HashMap<Channel, usize>,
    rejects: HashMap<Channel, UsbError>,
    submissions: usize,
    double_submissions: usize,
    written: Vec<Vec<u8>>,
    control_requests: Vec<ControlRequest>,
    control_error: Option<UsbError>,
}

impl MockState {
    fn queue(&mut self, channel: Channel) -> &mut VecDeque<Transfer> {
        self.queues.entry(channel).or_default()
    }
}

/// Transport that completes transfers on demand
#[derive(Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
    handler: Mutex<Option<Weak<dyn CompletionHandler>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse the next submission on `channel` with `error`
    pub fn reject_next(&self, channel: Channel, error: UsbError) {
        lock(&self.state).rejects.insert(channel, error);
    }

    /// Fail every control request from now on
    pub fn fail_control(&self, error: UsbError) {
        lock(&self.state).control_error = Some(error);
    }

    pub fn in_flight(&self, channel: Channel) -> usize {
        lock(&self.state).queues.get(&channel).map_or(0, VecDeque::len)
    }

    /// Highest number of transfers ever in flight at once on `channel`
    pub fn peak_in_flight(&self, channel: Channel) -> usize {
        lock(&self.state).peak.get(&channel).copied().unwrap_or(0)
    }

    pub fn submissions(&self) -> usize {
        lock(&self.state).submissions
    }

    /// Submissions of a transfer that was already in flight
    pub fn double_submissions(&self) -> usize {
        lock(&self.state).double_submissions
    }

    /// Payloads of every accepted bulk-out submission, in order
    pub fn written(&self) -> Vec<Vec<u8>> {
        lock(&self.state).written.clone()
    }

    pub fn control_requests(&self) -> Vec<ControlRequest> {
        lock(&self.state).control_requests.clone()
    }

    /// Complete the oldest transfer on `channel`
    ///
    /// Inbound transfers that complete successfully carry `payload`, cut to
    /// the transfer's capacity. Returns `false` if nothing was in flight.
    pub fn complete_next(&self, channel: Channel, status: TransferStatus, payload: &[u8]) -> bool {
        let mut transfer = {
            let mut state = lock(&self.state);
            let Some(transfer) = state.queue(channel).pop_front() else {
                return false;
            };
            state.outstanding.remove(&transfer.id());
            transfer
        };

        if channel != Channel::BulkOut && status.is_success() {
            let len = payload.len().min(transfer.capacity());
            transfer.buffer_mut()[..len].copy_from_slice(&payload[..len]);
            transfer.set_actual_length(len);
        }

        self.dispatch(transfer, status);
        true
    }

    /// Complete everything in flight on `channel`; returns how many
    pub fn complete_all(&self, channel: Channel, status: TransferStatus, payload: &[u8]) -> usize {
        let mut count = 0;
        // Bounded by what is queued now; completions may resubmit
        let queued = self.in_flight(channel);
        while count < queued && self.complete_next(channel, status.clone(), payload) {
            count += 1;
        }
        count
    }

    fn dispatch(&self, transfer: Transfer, status: TransferStatus) {
        let handler = lock(&self.handler).as_ref().and_then(Weak::upgrade);
        if let Some(handler) = handler {
            handler.complete(transfer, status);
        }
    }
}

impl Transport for MockTransport {
    fn bind(&self, handler: Weak<dyn CompletionHandler>) {
        *lock(&self.handler) = Some(handler);
    }

    fn submit(&self, transfer: Transfer) -> Result<(), Rejected> {
        let mut state = lock(&self.state);
        let channel = transfer.channel();

        if let Some(error) = state.rejects.remove(&channel) {
            return Err(Rejected::new(transfer, error));
        }

        state.submissions += 1;
        if !state.outstanding.insert(transfer.id()) {
            state.double_submissions += 1;
        }
        if channel == Channel::BulkOut {
            state.written.push(transfer.data().to_vec());
        }

        state.queue(channel).push_back(transfer);
        let depth = state.queue(channel).len();
        let peak = state.peak.entry(channel).or_default();
        *peak = (*peak).max(depth);
        Ok(())
    }

    fn cancel_all(&self, channel: Channel) {
        let cancelled: Vec<Transfer> = {
            let mut state = lock(&self.state);
            let drained: Vec<Transfer> = state.queue(channel).drain(..).collect();
            for transfer in &drained {
                state.outstanding.remove(&transfer.id());
            }
            drained
        };

        for transfer in cancelled {
            self.dispatch(transfer, TransferStatus::Cancelled);
        }
    }

    fn control_out(&self, request: &ControlRequest) -> Result<(), UsbError> {
        let mut state = lock(&self.state);
        state.control_requests.push(*request);
        match &state.control_error {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }
}

/// Sink that records what it accepts
///
/// With a limit it accepts at most that many bytes per call, which makes the
/// link's partial-accept loop visible.
#[derive(Default)]
pub struct RecordingSink {
    received: Mutex<Vec<u8>>,
    calls: Mutex<usize>,
    limit: Mutex<Option<usize>>,
}

impl RecordingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_limit(limit: usize) -> Arc<Self> {
        let sink = Self::default();
        *lock(&sink.limit) = Some(limit);
        Arc::new(sink)
    }

    /// A sink that accepts nothing
    pub fn refusing() -> Arc<Self> {
        Self::with_limit(0)
    }

    pub fn set_limit(&self, limit: Option<usize>) {
        *lock(&self.limit) = limit;
    }

    pub fn contents(&self) -> Vec<u8> {
        lock(&self.received).clone()
    }

    pub fn calls(&self) -> usize {
        *lock(&self.calls)
    }
}

impl Sink for RecordingSink {
    fn accept(&self, bytes: &[u8]) -> usize {
        *lock(&self.calls) += 1;
        let take = match *lock(&self.limit) {
            Some(limit) => bytes.len().min(limit),
            None => bytes.len(),
        };
        lock(&self.received).extend_from_slice(&bytes[..take]);
        take
    }
}

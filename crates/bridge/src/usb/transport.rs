//! Thread-backed rusb transport
//!
//! Every channel gets a lane: an unbounded queue and a thread that executes
//! the queued transfers one at a time with blocking rusb calls, then hands
//! each one back to the link. One transfer per lane is on the wire at a time;
//! the rest wait in FIFO order, which keeps per-channel submission order.

use crate::usb::device::Endpoints;
use crate::usb::transfers::{execute_control, execute_in, execute_out};
use anyhow::{Context, Result};
use async_channel::{Receiver, Sender, TrySendError};
use link::{CompletionHandler, Rejected, Transfer, Transport};
use protocol::{Channel, ControlRequest, Direction, TransferStatus, UsbError};
use rusb::DeviceHandle;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::JoinHandle;
use tracing::{debug, error, info, warn};

type HandlerSlot = Mutex<Option<Weak<dyn CompletionHandler>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Bookkeeping shared between a lane's owner and its thread
struct LaneState {
    channel: Channel,
    endpoint: u8,
    /// Submitted and not yet handed back
    outstanding: Mutex<usize>,
    idle: Condvar,
    cancelling: AtomicBool,
}

impl LaneState {
    fn started(&self) {
        *lock(&self.outstanding) += 1;
    }

    fn finished(&self) {
        let mut outstanding = lock(&self.outstanding);
        *outstanding = outstanding.saturating_sub(1);
        if *outstanding == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut outstanding = lock(&self.outstanding);
        while *outstanding > 0 {
            outstanding = self
                .idle
                .wait(outstanding)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

struct Lane {
    state: Arc<LaneState>,
    tx: Sender<Transfer>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// Everything a lane thread needs
struct LaneContext {
    state: Arc<LaneState>,
    rx: Receiver<Transfer>,
    handle: Arc<DeviceHandle<rusb::Context>>,
    handler: Arc<HandlerSlot>,
    disconnected: Arc<AtomicBool>,
}

impl LaneContext {
    fn run(self) {
        debug!("{} lane started on endpoint {:#x}", self.state.channel, self.state.endpoint);

        while let Ok(mut transfer) = self.rx.recv_blocking() {
            let status = match self.state.channel.direction() {
                Direction::In => execute_in(
                    &self.handle,
                    self.state.endpoint,
                    &mut transfer,
                    &self.state.cancelling,
                ),
                Direction::Out => execute_out(
                    &self.handle,
                    self.state.endpoint,
                    &transfer,
                    &self.state.cancelling,
                ),
            };

            if status == TransferStatus::Shutdown && !self.disconnected.swap(true, Ordering::AcqRel) {
                warn!("Device disconnected");
            }

            let handler = lock(&self.handler).as_ref().and_then(Weak::upgrade);
            match handler {
                Some(handler) => handler.complete(transfer, status),
                None => debug!("Dropping completion of {}, link is gone", transfer.id()),
            }

            self.state.finished();
        }

        debug!("{} lane stopped", self.state.channel);
    }
}

/// [`Transport`] over a claimed rusb interface
pub struct RusbTransport {
    handle: Arc<DeviceHandle<rusb::Context>>,
    handler: Arc<HandlerSlot>,
    lanes: HashMap<Channel, Lane>,
    disconnected: Arc<AtomicBool>,
    stopped: AtomicBool,
}

impl RusbTransport {
    /// Start a lane for every channel the interface has an endpoint for
    pub fn new(handle: Arc<DeviceHandle<rusb::Context>>, endpoints: &Endpoints) -> Result<Self> {
        let handler: Arc<HandlerSlot> = Arc::new(Mutex::new(None));
        let disconnected = Arc::new(AtomicBool::new(false));
        let mut lanes = HashMap::new();

        for channel in Channel::ALL {
            let Some(endpoint) = endpoints.for_channel(channel) else {
                debug!("No endpoint for {}, lane not started", channel);
                continue;
            };

            let state = Arc::new(LaneState {
                channel,
                endpoint: endpoint.address,
                outstanding: Mutex::new(0),
                idle: Condvar::new(),
                cancelling: AtomicBool::new(false),
            });
            let (tx, rx) = async_channel::unbounded();
            let context = LaneContext {
                state: state.clone(),
                rx,
                handle: handle.clone(),
                handler: handler.clone(),
                disconnected: disconnected.clone(),
            };

            let thread = std::thread::Builder::new()
                .name(format!("usb-{}", channel))
                .spawn(move || context.run())
                .with_context(|| format!("Failed to spawn {} lane", channel))?;

            lanes.insert(
                channel,
                Lane {
                    state,
                    tx,
                    thread: Mutex::new(Some(thread)),
                },
            );
        }

        Ok(Self {
            handle,
            handler,
            lanes,
            disconnected,
            stopped: AtomicBool::new(false),
        })
    }

    /// True once any lane has seen the device go away
    pub fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::Acquire)
    }

    /// Cancel everything and stop the lane threads
    pub fn shutdown(&self) {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return;
        }

        for lane in self.lanes.values() {
            lane.state.cancelling.store(true, Ordering::Release);
            lane.tx.close();
        }

        for lane in self.lanes.values() {
            if let Some(thread) = lock(&lane.thread).take()
                && thread.join().is_err()
            {
                error!("{} lane thread panicked", lane.state.channel);
            }
        }

        info!("USB transport stopped");
    }
}

impl Transport for RusbTransport {
    fn bind(&self, handler: Weak<dyn CompletionHandler>) {
        *lock(&self.handler) = Some(handler);
    }

    fn submit(&self, transfer: Transfer) -> Result<(), Rejected> {
        if self.is_disconnected() {
            return Err(Rejected::new(transfer, UsbError::NoDevice));
        }

        let Some(lane) = self.lanes.get(&transfer.channel()) else {
            return Err(Rejected::new(transfer, UsbError::NotFound));
        };

        lane.state.started();
        match lane.tx.try_send(transfer) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(transfer) | TrySendError::Full(transfer)) => {
                lane.state.finished();
                Err(Rejected::new(transfer, UsbError::NoDevice))
            }
        }
    }

    fn cancel_all(&self, channel: Channel) {
        let Some(lane) = self.lanes.get(&channel) else {
            return;
        };

        lane.state.cancelling.store(true, Ordering::Release);
        lane.state.wait_idle();
        if !lane.tx.is_closed() {
            lane.state.cancelling.store(false, Ordering::Release);
        }
        debug!("Cancelled all {} transfers", channel);
    }

    fn control_out(&self, request: &ControlRequest) -> Result<(), UsbError> {
        if self.is_disconnected() {
            return Err(UsbError::NoDevice);
        }
        execute_control(&self.handle, request)
    }
}

impl Drop for RusbTransport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

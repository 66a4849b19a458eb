//! Link controller
//!
//! Public surface of one modem port. Created when the device is attached,
//! dropped when it is detached; `open`/`close` arm and disarm the transfer
//! machinery in between.

use crate::config::{LinkConfig, POOL_SIZE};
use crate::control::{ControlStatus, InterruptSlot, StatusDecoder};
use crate::drain::DrainWorker;
use crate::error::LinkError;
use crate::read_pool::ReadPool;
use crate::sink::Sink;
use crate::sync::{lock, read, write};
use crate::transfer::Transfer;
use crate::transport::{CompletionHandler, Transport};
use crate::write_pool::WritePool;
use common::{WorkScheduler, create_work_queue};
use protocol::{Channel, ControlRequest, ModemStatus};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

/// Whether the worker and the status decoder may act
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Closed,
    Open,
}

/// Snapshot of where the link's transfers are
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkStats {
    pub free_write_slots: usize,
    pub writes_in_flight: usize,
    pub reads_in_flight: usize,
    pub reads_pending: usize,
    pub reads_parked: usize,
    pub interrupt_armed: bool,
}

/// State shared between the controller, the completion context and the drain worker
pub(crate) struct LinkCore {
    pub(crate) config: LinkConfig,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) lifecycle: RwLock<Lifecycle>,
    pub(crate) write: WritePool,
    pub(crate) read: ReadPool,
    pub(crate) interrupt: InterruptSlot,
    pub(crate) status: ControlStatus,
    pub(crate) decoder: StatusDecoder,
    pub(crate) scheduler: WorkScheduler,
    /// Held for the duration of every drain run
    pub(crate) drain_lock: Mutex<()>,
    pub(crate) write_ready: Notify,
}

impl LinkCore {
    fn new(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn Sink>,
        config: LinkConfig,
        scheduler: WorkScheduler,
    ) -> Self {
        Self {
            write: WritePool::new(config.write_buffer_size()),
            read: ReadPool::new(config.read_buffer_size()),
            interrupt: InterruptSlot::new(config.interrupt_buffer_size()),
            status: ControlStatus::new(),
            decoder: StatusDecoder::new(config.port_number, config.is_control_port()),
            lifecycle: RwLock::new(Lifecycle::Closed),
            drain_lock: Mutex::new(()),
            write_ready: Notify::new(),
            config,
            transport,
            sink,
            scheduler,
        }
    }

    pub(crate) fn is_open(&self) -> bool {
        *read(&self.lifecycle) == Lifecycle::Open
    }

    /// Put a drained or failed read back on the wire, or park it if the link closed
    pub(crate) fn resubmit_read(&self, transfer: Transfer) {
        let state = read(&self.lifecycle);
        if *state != Lifecycle::Open {
            self.read.park(transfer);
            return;
        }
        if let Err(e) = self.read.submit(self.transport.as_ref(), transfer) {
            error!("Error re-submitting read transfer: {}", e);
        }
    }

    /// Retry reads the transport refused earlier
    pub(crate) fn retry_parked_reads(&self) {
        let state = read(&self.lifecycle);
        if *state != Lifecycle::Open {
            return;
        }
        let parked = self.read.take_parked();
        if parked.is_empty() {
            return;
        }
        debug!("Retrying {} parked read transfers", parked.len());
        if let Err(e) = self.submit_reads(parked) {
            warn!("Parked read retry failed: {}", e);
        }
    }

    /// Rearm an interrupt transfer the transport refused earlier
    pub(crate) fn retry_parked_interrupt(&self) {
        if !self.config.is_control_port() {
            return;
        }
        let state = read(&self.lifecycle);
        if *state != Lifecycle::Open {
            return;
        }
        let Some(transfer) = self.interrupt.take() else {
            return;
        };
        debug!("Retrying parked interrupt transfer");
        if let Err(e) = self.interrupt.submit(self.transport.as_ref(), transfer) {
            warn!("Parked interrupt retry failed: {}", e);
        }
    }

    /// Submit read transfers in order; on the first refusal park the rest
    fn submit_reads(&self, transfers: Vec<Transfer>) -> Result<usize, LinkError> {
        let mut transfers = transfers.into_iter();
        let mut submitted = 0;
        while let Some(transfer) = transfers.next() {
            if let Err(e) = self.read.submit(self.transport.as_ref(), transfer) {
                for rest in transfers.by_ref() {
                    self.read.park(rest);
                }
                return Err(e);
            }
            submitted += 1;
        }
        Ok(submitted)
    }

    /// Submit the interrupt transfer and every read transfer
    fn arm(&self) -> Result<(), LinkError> {
        if self.config.is_control_port() {
            match self.interrupt.take() {
                Some(transfer) => {
                    if let Err(e) = self.interrupt.submit(self.transport.as_ref(), transfer) {
                        error!("Failed to submit interrupt transfer: {}", e);
                        return Err(e);
                    }
                }
                None => warn!("Interrupt transfer is not available to arm"),
            }
        }

        let reads = self.read.take_parked();
        if reads.len() != POOL_SIZE {
            warn!("Only {} of {} read transfers available", reads.len(), POOL_SIZE);
        }
        if let Err(e) = self.submit_reads(reads) {
            error!("Failed to submit bulk read transfer: {}", e);
            return Err(e);
        }
        Ok(())
    }

    /// Stop all I/O and return every transfer to its pool
    ///
    /// On return nothing is in flight, the drain worker is idle and the
    /// pending queue is empty. Returns the number of undrained reads dropped.
    fn teardown(&self) -> usize {
        *write(&self.lifecycle) = Lifecycle::Closed;

        for channel in Channel::ALL {
            if channel == Channel::Interrupt && !self.config.is_control_port() {
                continue;
            }
            self.transport.cancel_all(channel);
        }

        // Wait out a drain run in progress; anything it resubmits now gets parked
        let _idle = lock(&self.drain_lock);
        let dropped = self.read.scuttle_pending();

        self.status.reset();

        let writes = self.write.in_flight();
        let reads = self.read.in_flight();
        let interrupt = self.interrupt.is_in_flight();
        if writes != 0 || reads != 0 || interrupt {
            warn!(
                "Transfers still in flight after cancel: {} writes, {} reads, interrupt {}",
                writes,
                reads,
                interrupt
            );
        }

        self.write_ready.notify_waiters();
        dropped
    }
}

/// One attached modem port
pub struct LinkController {
    core: Arc<LinkCore>,
    /// Serializes open/close
    transition: Mutex<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl LinkController {
    /// Build the pools, bind to the transport and start the drain worker
    pub fn attach(
        transport: Arc<dyn Transport>,
        sink: Arc<dyn Sink>,
        config: LinkConfig,
    ) -> Result<Self, LinkError> {
        config.validate()?;

        let (scheduler, receiver) = create_work_queue();
        let core = Arc::new(LinkCore::new(transport, sink, config, scheduler));

        let handler: Arc<dyn CompletionHandler> = core.clone();
        core.transport.bind(Arc::downgrade(&handler));

        let worker = DrainWorker::spawn(core.clone(), receiver)?;

        info!(
            "Attached port {}: write buffers {} bytes, read buffers {} bytes",
            core.config.port_number,
            core.write.buffer_size(),
            core.read.buffer_size()
        );

        Ok(Self {
            core,
            transition: Mutex::new(()),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Arm the interrupt channel (modem port only) and all read transfers
    ///
    /// If any submission fails, everything already submitted is cancelled and
    /// the link stays closed.
    pub fn open(&self) -> Result<(), LinkError> {
        let _transition = lock(&self.transition);
        {
            let mut state = write(&self.core.lifecycle);
            if *state == Lifecycle::Open {
                return Err(LinkError::AlreadyOpen);
            }
            *state = Lifecycle::Open;
        }

        self.core.status.reset();

        if let Err(e) = self.core.arm() {
            self.core.teardown();
            return Err(e);
        }

        info!("Opened port {}", self.core.config.port_number);
        Ok(())
    }

    /// Cancel all I/O, wait for the drain worker, discard undrained reads
    ///
    /// Returns once no completion can fire and no drain run is in progress.
    /// Closing a closed link does nothing.
    pub fn close(&self) {
        let _transition = lock(&self.transition);
        if !self.is_open() {
            debug!("Port {} already closed", self.core.config.port_number);
            return;
        }

        let dropped = self.core.teardown();
        info!(
            "Closed port {} ({} undrained reads dropped)",
            self.core.config.port_number, dropped
        );
    }

    /// Queue at most one write buffer of `bytes`
    ///
    /// Returns the number of bytes accepted: fewer than offered when `bytes`
    /// exceeds the buffer size, and 0 when every buffer is busy or the link
    /// is not open. The caller retries with the remainder.
    pub fn write(&self, bytes: &[u8]) -> Result<usize, LinkError> {
        if bytes.is_empty() {
            return Ok(0);
        }

        let state = read(&self.core.lifecycle);
        if *state != Lifecycle::Open {
            debug!("Write of {} bytes on closed port", bytes.len());
            return Ok(0);
        }

        let Some(transfer) = self.core.write.acquire() else {
            debug!("All write buffers busy");
            return Ok(0);
        };

        self.core.write.submit(
            self.core.transport.as_ref(),
            transfer,
            bytes,
            self.core.config.trace_data,
        )
    }

    /// Wait until a write buffer may be free
    ///
    /// Resolves after any write completion that frees a slot, or a close. A
    /// free slot is likely but not guaranteed; `write` may still return 0.
    pub async fn writable(&self) {
        if self.core.write.free_slots() > 0 {
            return;
        }
        self.core.write_ready.notified().await;
    }

    /// Current modem control-line status
    pub fn read_status(&self) -> ModemStatus {
        self.core.status.snapshot()
    }

    /// Raise or drop DTR; a no-op on ports other than the modem port
    pub fn set_dtr(&self, on: bool) -> Result<(), LinkError> {
        if !self.core.config.is_control_port() {
            debug!(
                "DTR request on port {} ignored, not the modem port",
                self.core.config.port_number
            );
            return Ok(());
        }

        let request = ControlRequest::set_dtr(on, self.core.config.port_number);
        self.core.transport.control_out(&request).map_err(|e| {
            error!("DTR control request failed: {}", e);
            LinkError::Control(e)
        })
    }

    /// Apply a set/clear pair of modem lines
    ///
    /// Only DTR is driven; clearing takes precedence over setting.
    pub fn set_lines(&self, set: ModemStatus, clear: ModemStatus) -> Result<(), LinkError> {
        if clear.contains(ModemStatus::DTR) {
            return self.set_dtr(false);
        }
        if set.contains(ModemStatus::DTR) {
            return self.set_dtr(true);
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.core.is_open()
    }

    pub fn config(&self) -> &LinkConfig {
        &self.core.config
    }

    pub fn stats(&self) -> LinkStats {
        LinkStats {
            free_write_slots: self.core.write.free_slots(),
            writes_in_flight: self.core.write.in_flight(),
            reads_in_flight: self.core.read.in_flight(),
            reads_pending: self.core.read.pending(),
            reads_parked: self.core.read.parked(),
            interrupt_armed: self.core.interrupt.is_in_flight(),
        }
    }

    /// Close the port and stop its drain worker
    pub fn detach(self) {
        drop(self);
    }
}

impl Drop for LinkController {
    fn drop(&mut self) {
        self.close();
        self.core.scheduler.shutdown();

        if let Some(worker) = lock(&self.worker).take()
            && worker.join().is_err()
        {
            error!("Drain worker thread panicked");
        }

        info!("Detached port {}", self.core.config.port_number);
    }
}

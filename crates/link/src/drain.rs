//! Read drain worker
//!
//! One blocking worker thread per link. It sleeps until the completion
//! context schedules it, then empties the pending queue: each buffer is pushed
//! into the sink and the transfer goes straight back to the transport. Runs
//! never overlap; `close` takes the same lock to wait out a run in progress.

use crate::controller::LinkCore;
use crate::error::LinkError;
use crate::sink::deliver;
use crate::sync::lock;
use common::WorkReceiver;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, error, info, trace, warn};

pub(crate) struct DrainWorker {
    core: Arc<LinkCore>,
    receiver: WorkReceiver,
}

impl DrainWorker {
    pub(crate) fn spawn(
        core: Arc<LinkCore>,
        receiver: WorkReceiver,
    ) -> Result<JoinHandle<()>, LinkError> {
        let name = format!("link-drain-{}", core.config.port_number);
        let worker = DrainWorker { core, receiver };
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || worker.run())?;
        Ok(handle)
    }

    fn run(self) {
        info!("Drain worker started for port {}", self.core.config.port_number);

        while self.receiver.wait().is_ok() {
            // A panicking sink must not take the worker down with it
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                self.core.drain_pending()
            }));

            if let Err(e) = result {
                error!("Panic in read drain: {:?}", e);
            }
        }

        info!("Drain worker stopped for port {}", self.core.config.port_number);
    }
}

impl LinkCore {
    /// Drain the pending queue to empty, or until the link closes
    ///
    /// Returns the number of buffers drained.
    pub(crate) fn drain_pending(&self) -> usize {
        let _running = lock(&self.drain_lock);
        let mut drained = 0;

        // Once closed, whatever is still pending is left for close to discard
        while self.is_open() {
            let Some(transfer) = self.read.pop_pending() else {
                break;
            };
            let id = transfer.id();
            debug!("Processing read {} len {}", id, transfer.len());
            if self.config.trace_data {
                trace!("{} to sink: {:02x?}", id, transfer.data());
            }

            let delivered = deliver(self.sink.as_ref(), transfer.data());
            if delivered != transfer.len() {
                warn!(
                    "Dropped {} of {} bytes from {}",
                    transfer.len() - delivered,
                    transfer.len(),
                    id
                );
            }

            self.resubmit_read(transfer);
            drained += 1;
        }

        self.retry_parked_reads();
        self.retry_parked_interrupt();
        drained
    }
}

//! Completion routing
//!
//! Runs in the completion context: whatever thread the transport finishes a
//! transfer on. Nothing here blocks on the sink. Writes free their slot and
//! wake the producer; reads are queued for the drain worker; interrupt
//! notifications are decoded and the transfer is rearmed.
//!
//! Resubmission and queueing happen under the lifecycle read lock, so once
//! `close` has flipped the link to closed no completion can put a transfer
//! back on the wire.

use crate::controller::{Lifecycle, LinkCore};
use crate::sync::read;
use crate::transfer::Transfer;
use crate::transport::CompletionHandler;
use protocol::{Channel, TransferStatus};
use tracing::{debug, error, trace, warn};

impl CompletionHandler for LinkCore {
    fn complete(&self, transfer: Transfer, status: TransferStatus) {
        match transfer.channel() {
            Channel::BulkOut => self.write_completed(transfer, status),
            Channel::BulkIn => self.read_completed(transfer, status),
            Channel::Interrupt => self.interrupt_completed(transfer, status),
        }
    }
}

impl LinkCore {
    fn write_completed(&self, transfer: Transfer, status: TransferStatus) {
        let id = transfer.id();
        match &status {
            TransferStatus::Completed => debug!("Write {} completed", id),
            TransferStatus::Failed(e) => warn!("Write {} non-zero status: {}", id, e),
            TransferStatus::Cancelled | TransferStatus::Shutdown => {
                debug!("Write {} terminated, status {:?}", id, status)
            }
        }

        // Failed or not, the slot is free again
        if self.write.release(transfer).is_ok() {
            self.write_ready.notify_one();
        }
    }

    fn read_completed(&self, transfer: Transfer, status: TransferStatus) {
        let id = transfer.id();
        if !self.read.owns(&transfer) {
            warn!("Completion for unknown read transfer {}", id);
            return;
        }
        if !self.read.landed(id) {
            warn!("Read {} completed but was not in flight", id);
        }

        match status {
            TransferStatus::Completed => {
                let state = read(&self.lifecycle);
                if *state != Lifecycle::Open {
                    self.read.park(transfer);
                    return;
                }
                if self.config.trace_data {
                    trace!("{} in {} bytes: {:02x?}", id, transfer.len(), transfer.data());
                }
                self.read.push_pending(transfer);
                self.scheduler.schedule();
            }
            status if status.is_terminal() => {
                debug!("Read {} terminated, status {:?}", id, status);
                self.read.park(transfer);
            }
            TransferStatus::Failed(e) => {
                warn!("Read {} non-zero status: {}", id, e);
                // Straight back into use
                self.resubmit_read(transfer);
            }
            // Terminal statuses are handled above
            TransferStatus::Cancelled | TransferStatus::Shutdown => self.read.park(transfer),
        }
    }

    fn interrupt_completed(&self, transfer: Transfer, status: TransferStatus) {
        if !self.interrupt.owns(&transfer) {
            warn!("Completion for unknown interrupt transfer {}", transfer.id());
            return;
        }
        self.interrupt.landed();

        if status.is_terminal() {
            debug!("Interrupt transfer terminated, status {:?}", status);
            self.interrupt.park(transfer);
            return;
        }

        let state = read(&self.lifecycle);
        if *state != Lifecycle::Open {
            self.interrupt.park(transfer);
            return;
        }

        match &status {
            TransferStatus::Completed => {
                if self.config.trace_data {
                    trace!(
                        "Interrupt {} bytes: {:02x?}",
                        transfer.len(),
                        transfer.data()
                    );
                }
                self.decoder.decode(&self.status, transfer.data());
            }
            other => debug!("Interrupt transfer non-zero status {:?}", other),
        }

        if let Err(e) = self.interrupt.submit(self.transport.as_ref(), transfer) {
            error!("Error re-submitting interrupt transfer: {}", e);
            // Parked; the drain worker retries it
            self.scheduler.schedule();
        }
    }
}

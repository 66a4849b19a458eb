//! Blocking transfer execution
//!
//! Runs one link transfer at a time against rusb and turns the outcome into
//! a [`TransferStatus`].

use link::Transfer;
use protocol::{Channel, ControlRequest, TransferStatus, UsbError};
use rusb::{Context, DeviceHandle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// IN reads poll at this interval so cancellation is noticed promptly
pub const IN_POLL_TIMEOUT: Duration = Duration::from_millis(100);

/// Timeout for a single bulk OUT write
pub const OUT_TIMEOUT: Duration = Duration::from_secs(1);

/// Receive into `transfer`, polling until data arrives or `cancelled` is set
pub fn execute_in(
    handle: &DeviceHandle<Context>,
    endpoint: u8,
    transfer: &mut Transfer,
    cancelled: &AtomicBool,
) -> TransferStatus {
    loop {
        if cancelled.load(Ordering::Acquire) {
            return TransferStatus::Cancelled;
        }

        let result = match transfer.channel() {
            Channel::Interrupt => {
                handle.read_interrupt(endpoint, transfer.buffer_mut(), IN_POLL_TIMEOUT)
            }
            _ => handle.read_bulk(endpoint, transfer.buffer_mut(), IN_POLL_TIMEOUT),
        };

        match result {
            Ok(len) => {
                transfer.set_actual_length(len);
                return TransferStatus::Completed;
            }
            Err(rusb::Error::Timeout) => continue,
            Err(e) => return status_for(e),
        }
    }
}

/// Send the payload of `transfer`
pub fn execute_out(
    handle: &DeviceHandle<Context>,
    endpoint: u8,
    transfer: &Transfer,
    cancelled: &AtomicBool,
) -> TransferStatus {
    if cancelled.load(Ordering::Acquire) {
        return TransferStatus::Cancelled;
    }

    match handle.write_bulk(endpoint, transfer.data(), OUT_TIMEOUT) {
        Ok(len) => {
            if len != transfer.len() {
                warn!(
                    "Short write on {}: {} of {} bytes",
                    transfer.id(),
                    len,
                    transfer.len()
                );
            }
            TransferStatus::Completed
        }
        Err(e) => status_for(e),
    }
}

/// Send a control request without a data stage
pub fn execute_control(
    handle: &DeviceHandle<Context>,
    request: &ControlRequest,
) -> Result<(), UsbError> {
    debug!(
        "Control transfer: request_type={:#x}, request={:#x}, value={:#x}, index={:#x}",
        request.request_type, request.request, request.value, request.index
    );

    handle
        .write_control(
            request.request_type,
            request.request,
            request.value,
            request.index,
            &[],
            request.timeout,
        )
        .map(|_| ())
        .map_err(map_rusb_error)
}

/// Completion status for a failed rusb call
///
/// A vanished device is reported as `Shutdown` so the link stops
/// resubmitting.
pub fn status_for(err: rusb::Error) -> TransferStatus {
    match err {
        rusb::Error::NoDevice => TransferStatus::Shutdown,
        other => TransferStatus::Failed(map_rusb_error(other)),
    }
}

/// Map rusb::Error to protocol::UsbError
pub fn map_rusb_error(err: rusb::Error) -> UsbError {
    match err {
        rusb::Error::Timeout => UsbError::Timeout,
        rusb::Error::Pipe => UsbError::Pipe,
        rusb::Error::NoDevice => UsbError::NoDevice,
        rusb::Error::NotFound => UsbError::NotFound,
        rusb::Error::Busy => UsbError::Busy,
        rusb::Error::Overflow => UsbError::Overflow,
        rusb::Error::Io => UsbError::Io,
        rusb::Error::InvalidParam => UsbError::InvalidParam,
        rusb::Error::Access => UsbError::Access,
        _ => UsbError::Other {
            message: err.to_string(),
        },
    }
}

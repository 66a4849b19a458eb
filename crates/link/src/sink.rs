//! Byte-stream sink boundary

use tracing::debug;

/// Consumer of inbound bytes (a terminal line discipline, a pipe, ...)
///
/// May accept fewer bytes than offered. Called only from the drain worker.
pub trait Sink: Send + Sync {
    fn accept(&self, bytes: &[u8]) -> usize;
}

impl<F> Sink for F
where
    F: Fn(&[u8]) -> usize + Send + Sync,
{
    fn accept(&self, bytes: &[u8]) -> usize {
        self(bytes)
    }
}

/// Push `bytes` into `sink`, retrying partial accepts
///
/// Stops as soon as the sink accepts nothing, so the loop runs at most once
/// per byte. Returns the number of bytes the sink took.
pub fn deliver(sink: &dyn Sink, bytes: &[u8]) -> usize {
    let mut remaining = bytes;
    while !remaining.is_empty() {
        let accepted = sink.accept(remaining).min(remaining.len());
        if accepted != remaining.len() {
            debug!("Sink took only {} of {} bytes", accepted, remaining.len());
        }
        if accepted == 0 {
            break;
        }
        remaining = &remaining[accepted..];
    }
    bytes.len() - remaining.len()
}

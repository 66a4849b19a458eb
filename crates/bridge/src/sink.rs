//! Inbound data sink for the CLI

use link::Sink;
use std::io::{ErrorKind, Stdout, Write};
use std::sync::{Mutex, PoisonError};
use tracing::warn;

/// Writes inbound modem data to any `Write`, flushing after every buffer
pub struct WriterSink<W> {
    writer: Mutex<W>,
}

pub type StdoutSink = WriterSink<Stdout>;

impl StdoutSink {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> Sink for WriterSink<W> {
    fn accept(&self, bytes: &[u8]) -> usize {
        let mut writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let written = loop {
            match writer.write(bytes) {
                Ok(n) => break n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("Output write failed: {}", e);
                    return 0;
                }
            }
        };
        if let Err(e) = writer.flush() {
            warn!("Output flush failed: {}", e);
        }
        written
    }
}

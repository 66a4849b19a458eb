//! Modem link engine
//!
//! Moves bytes between a host-side serial port and a USB modem's bulk
//! endpoints. Outbound data goes through a fixed pool of write transfers;
//! inbound data is received by a fixed pool of read transfers whose
//! completions are drained to a [`Sink`] by a per-link worker thread. On the
//! modem port an interrupt transfer tracks the control lines.
//!
//! The engine talks to hardware only through the [`Transport`] trait.

mod completion;
pub mod config;
pub mod control;
pub mod controller;
mod drain;
pub mod error;
pub mod read_pool;
pub mod sink;
mod sync;
pub mod test_utils;
pub mod transfer;
pub mod transport;
pub mod write_pool;

pub use config::{LinkConfig, MODEM_INTERFACE_NUM, POOL_SIZE};
pub use control::ControlStatus;
pub use controller::{Lifecycle, LinkController, LinkStats};
pub use error::LinkError;
pub use sink::Sink;
pub use transfer::{Transfer, TransferId};
pub use transport::{CompletionHandler, Rejected, Transport};

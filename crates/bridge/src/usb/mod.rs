//! USB side of the bridge
//!
//! Opens the modem with rusb and adapts it to the link's transport boundary.
//! All rusb calls are blocking; they run on dedicated lane threads so the
//! Tokio runtime never waits on the device.

pub mod device;
pub mod transfers;
pub mod transport;

pub use device::ModemDevice;
pub use transport::RusbTransport;

//! Wire-level vocabulary for the modem link
//!
//! This crate defines everything that has a fixed encoding on the USB side of
//! the link: the interrupt-channel notification codes and their parser, the
//! device's line-state byte, the terminal-facing modem-status bitmask, the
//! class control request used to drive DTR, and the transport error taxonomy.
//!
//! # Example
//!
//! ```
//! use protocol::{LineState, ModemStatus, Notification};
//!
//! let payload = Notification::ModemStatus(LineState::CARRIER).to_bytes();
//! let notification = Notification::parse(&payload).unwrap();
//!
//! let status = ModemStatus::empty().apply_line_state(notification.line_state().unwrap());
//! assert!(status.contains(ModemStatus::CAR));
//! assert!(!status.contains(ModemStatus::DSR));
//! ```

pub mod control;
pub mod error;
pub mod notification;
pub mod status;
pub mod types;

pub use control::ControlRequest;
pub use error::{NotificationError, ProtocolError, Result};
pub use notification::{
    MODEM_STATUS_MIN_LEN, NOTIFICATION_HEADER_LEN, Notification, NotificationCode,
};
pub use status::{LineState, ModemStatus};
pub use types::{Channel, Direction, TransferStatus, UsbError};

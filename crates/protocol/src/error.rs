//! Protocol error types

use thiserror::Error;

/// A notification that could not be decoded
///
/// None of these are fatal: the interrupt channel stays armed and the
/// notification is dropped after being logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NotificationError {
    /// Payload too short to carry a notification code
    #[error("Notification too short: {actual} bytes (need {needed})")]
    TooShort { needed: usize, actual: usize },

    /// Modem status notification without its line-state byte
    #[error("Modem status notification too short: {actual} bytes (need {needed})")]
    ModemStatusTooShort { needed: usize, actual: usize },

    /// Code not documented for this firmware
    #[error("Undefined notification code {0:#06x}")]
    Unknown(u16),
}

/// Protocol-level errors
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Malformed interrupt notification
    #[error("Malformed notification: {0}")]
    Notification(#[from] NotificationError),

    /// Transport failure reported by the USB layer
    #[error("USB error: {0}")]
    Usb(#[from] crate::types::UsbError),
}

/// Type alias for protocol results
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = NotificationError::ModemStatusTooShort {
            needed: 9,
            actual: 7,
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Modem status"));
        assert!(msg.contains("7 bytes"));
    }

    #[test]
    fn test_unknown_code_display() {
        let err = ProtocolError::from(NotificationError::Unknown(0x1234));
        let msg = format!("{}", err);
        assert!(msg.contains("0x1234"));
    }
}

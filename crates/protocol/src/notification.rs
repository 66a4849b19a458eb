//! Interrupt-channel notifications
//!
//! Each notification starts with a CDC-style header: `bmRequestType` and
//! `bNotification`, read together as one little-endian 16-bit code, followed
//! by `wValue`, `wIndex` and `wLength`. A modem-status notification carries
//! the device line state in its first data byte, at offset 8.
//!
//! ```text
//! offset  0      1        2..4    4..6    6..8     8
//!        +------+--------+-------+-------+--------+-----------+
//!        | 0xa1 | 0x20   | value | index | length | line state|
//!        +------+--------+-------+-------+--------+-----------+
//! ```

use crate::error::NotificationError;
use crate::status::LineState;
use byteorder::{ByteOrder, LittleEndian};

/// Bytes needed to read the notification code
pub const NOTIFICATION_HEADER_LEN: usize = 2;

/// Minimum length of a modem-status notification
pub const MODEM_STATUS_MIN_LEN: usize = 9;

/// Offset of the line-state byte in a modem-status notification
pub const LINE_STATE_OFFSET: usize = 8;

/// Full CDC header length (request type, notification, value, index, length)
const CDC_HEADER_LEN: usize = 8;

/// Documented notification codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum NotificationCode {
    ModemStatus = 0x20a1,
    ResponseAvailable = 0x01a1,
    SpeedChange = 0x2aa1,
}

impl NotificationCode {
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            0x20a1 => Some(NotificationCode::ModemStatus),
            0x01a1 => Some(NotificationCode::ResponseAvailable),
            0x2aa1 => Some(NotificationCode::SpeedChange),
            _ => None,
        }
    }

    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

/// A decoded interrupt notification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notification {
    /// Control lines changed
    ModemStatus(LineState),
    /// Encapsulated response is waiting on the control endpoint
    ResponseAvailable,
    /// Link speed changed
    SpeedChange,
}

impl Notification {
    /// Decode a notification payload
    ///
    /// Bytes past the fields this parser needs are ignored, as are unknown
    /// bits in the line-state byte.
    pub fn parse(data: &[u8]) -> Result<Self, NotificationError> {
        if data.len() < NOTIFICATION_HEADER_LEN {
            return Err(NotificationError::TooShort {
                needed: NOTIFICATION_HEADER_LEN,
                actual: data.len(),
            });
        }

        let raw = LittleEndian::read_u16(&data[..NOTIFICATION_HEADER_LEN]);
        match NotificationCode::from_u16(raw) {
            Some(NotificationCode::ModemStatus) => {
                if data.len() < MODEM_STATUS_MIN_LEN {
                    return Err(NotificationError::ModemStatusTooShort {
                        needed: MODEM_STATUS_MIN_LEN,
                        actual: data.len(),
                    });
                }
                Ok(Notification::ModemStatus(LineState::from_bits_retain(
                    data[LINE_STATE_OFFSET],
                )))
            }
            Some(NotificationCode::ResponseAvailable) => Ok(Notification::ResponseAvailable),
            Some(NotificationCode::SpeedChange) => Ok(Notification::SpeedChange),
            None => Err(NotificationError::Unknown(raw)),
        }
    }

    pub fn code(&self) -> NotificationCode {
        match self {
            Notification::ModemStatus(_) => NotificationCode::ModemStatus,
            Notification::ResponseAvailable => NotificationCode::ResponseAvailable,
            Notification::SpeedChange => NotificationCode::SpeedChange,
        }
    }

    /// Line state carried by a modem-status notification
    pub fn line_state(&self) -> Option<LineState> {
        match self {
            Notification::ModemStatus(state) => Some(*state),
            _ => None,
        }
    }

    /// Encode as the device would send it
    pub fn to_bytes(&self) -> Vec<u8> {
        let data_len = match self {
            Notification::ModemStatus(_) => 1,
            _ => 0,
        };

        let mut buf = vec![0u8; CDC_HEADER_LEN + data_len];
        LittleEndian::write_u16(&mut buf[0..2], self.code().as_u16());
        LittleEndian::write_u16(&mut buf[6..8], data_len as u16);
        if let Notification::ModemStatus(state) = self {
            buf[LINE_STATE_OFFSET] = state.bits();
        }
        buf
    }
}

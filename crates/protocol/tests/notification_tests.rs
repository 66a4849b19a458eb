//! Integration tests for notification decoding
//!
//! Covers the wire format the modem firmware sends on the interrupt endpoint
//! and checks that arbitrary payloads never make the parser panic.

use proptest::prelude::*;
use protocol::{
    LineState, MODEM_STATUS_MIN_LEN, ModemStatus, Notification, NotificationCode,
    NotificationError,
};

/// A modem-status notification as captured from the device: carrier and DSR up
const CAPTURED_MODEM_STATUS: [u8; 10] = [0xa1, 0x20, 0x00, 0x00, 0x04, 0x00, 0x02, 0x00, 0x03, 0x00];

#[test]
fn test_captured_modem_status() {
    let notification = Notification::parse(&CAPTURED_MODEM_STATUS).unwrap();
    assert_eq!(notification.code(), NotificationCode::ModemStatus);

    let state = notification.line_state().unwrap();
    assert_eq!(state, LineState::CARRIER | LineState::DSR);

    let status = ModemStatus::DTR.apply_line_state(state);
    assert_eq!(status, ModemStatus::DTR | ModemStatus::CAR | ModemStatus::DSR);
}

#[test]
fn test_modem_status_length_boundary() {
    let full = Notification::ModemStatus(LineState::RING).to_bytes();
    assert_eq!(full.len(), MODEM_STATUS_MIN_LEN);

    assert!(Notification::parse(&full).is_ok());
    assert_eq!(
        Notification::parse(&full[..MODEM_STATUS_MIN_LEN - 1]),
        Err(NotificationError::ModemStatusTooShort {
            needed: MODEM_STATUS_MIN_LEN,
            actual: MODEM_STATUS_MIN_LEN - 1,
        })
    );
}

#[test]
fn test_header_only_notifications() {
    assert_eq!(
        Notification::parse(&[0xa1, 0x01]),
        Ok(Notification::ResponseAvailable)
    );
    assert_eq!(Notification::parse(&[0xa1, 0x2a]), Ok(Notification::SpeedChange));
    assert_eq!(
        Notification::parse(&[0xa1]),
        Err(NotificationError::TooShort {
            needed: 2,
            actual: 1
        })
    );
}

#[test]
fn test_unknown_code_is_reported() {
    let err = Notification::parse(&[0xa1, 0x7f, 0, 0, 0, 0, 0, 0, 0]).unwrap_err();
    assert_eq!(err, NotificationError::Unknown(0x7fa1));
}

proptest! {
    #[test]
    fn parse_never_panics(data in proptest::collection::vec(any::<u8>(), 0..64)) {
        let _ = Notification::parse(&data);
    }

    #[test]
    fn modem_status_reads_offset_eight(
        state in any::<u8>(),
        padding in proptest::collection::vec(any::<u8>(), 0..8),
    ) {
        let mut payload = vec![0xa1, 0x20, 0, 0, 0, 0, 0, 0, state];
        payload.extend(padding);

        let notification = Notification::parse(&payload).unwrap();
        prop_assert_eq!(notification.line_state().map(|s| s.bits()), Some(state));
    }

    #[test]
    fn line_state_preserves_unrelated_bits(initial in any::<u16>(), state in any::<u8>()) {
        let tracked = ModemStatus::CAR | ModemStatus::DSR | ModemStatus::RNG;
        let before = ModemStatus::from_bits_retain(initial);
        let after = before.apply_line_state(LineState::from_bits_retain(state));

        prop_assert_eq!(after.bits() & !tracked.bits(), before.bits() & !tracked.bits());
    }
}

//! Test utilities for the modem link
//!
//! Provides notification builders and timing helpers for tests across crates.
//!
//! # Example
//!
//! ```
//! use common::test_utils::modem_status_notification;
//! use protocol::{LineState, Notification};
//!
//! let payload = modem_status_notification(LineState::CARRIER);
//! assert_eq!(
//!     Notification::parse(&payload).unwrap(),
//!     Notification::ModemStatus(LineState::CARRIER)
//! );
//! ```

use protocol::{LineState, Notification};
use std::future::Future;
use std::time::{Duration, Instant};

/// Default test timeout (5 seconds)
pub const DEFAULT_TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between predicate checks in [`wait_until`]
const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// Modem-status notification exactly as the device sends it
pub fn modem_status_notification(state: LineState) -> Vec<u8> {
    Notification::ModemStatus(state).to_bytes()
}

/// Modem-status notification cut to `len` bytes
pub fn truncated_modem_status(state: LineState, len: usize) -> Vec<u8> {
    let mut payload = modem_status_notification(state);
    payload.truncate(len);
    payload
}

/// Notification with an arbitrary (possibly undocumented) code
pub fn raw_notification(code: u16, len: usize) -> Vec<u8> {
    let mut payload = vec![0u8; len.max(2)];
    payload[..2].copy_from_slice(&code.to_le_bytes());
    payload
}

/// Poll `predicate` until it holds or `timeout` elapses
///
/// Returns the final value of the predicate.
pub fn wait_until<F>(timeout: Duration, mut predicate: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

/// Run a future with a timeout
pub async fn with_timeout<F, T>(timeout: Duration, future: F) -> Result<T, &'static str>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(timeout, future)
        .await
        .map_err(|_| "Test timed out")
}

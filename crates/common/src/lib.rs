//! Common utilities for the modem link
//!
//! This crate provides functionality shared between the link engine and the
//! bridge binary: error handling, logging setup, and the work-queue bridge
//! that hands completed reads from the completion context to the drain worker.

pub mod channel;
pub mod error;
pub mod logging;
pub mod test_utils;

pub use channel::{WorkReceiver, WorkScheduler, create_work_queue};
pub use error::{Error, Result};
pub use logging::setup_logging;

//! Link error types

use crate::transfer::TransferId;
use protocol::{Channel, UsbError};
use thiserror::Error;

/// Errors surfaced by the link
///
/// Pool exhaustion is not an error: `write` reports it as `Ok(0)`.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The transport refused a submission
    #[error("Transport rejected {channel} submission: {error}")]
    Submit { channel: Channel, error: UsbError },

    /// Out-of-band control request failed
    #[error("Control request failed: {0}")]
    Control(UsbError),

    /// `open` on a link that is already open
    #[error("Link is already open")]
    AlreadyOpen,

    /// A transfer came back that no pool tracks
    #[error("Unknown transfer {0}")]
    UnknownHandle(TransferId),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Drain worker could not be started
    #[error("Drain worker error: {0}")]
    Worker(#[from] std::io::Error),
}

impl From<LinkError> for common::Error {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::Submit { error, .. } | LinkError::Control(error) => {
                common::Error::Transport(error)
            }
            LinkError::Config(message) => common::Error::Config(message),
            LinkError::Worker(e) => common::Error::Io(e),
            other => common::Error::Other(other.to_string()),
        }
    }
}

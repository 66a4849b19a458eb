//! Link configuration

use crate::error::LinkError;
use protocol::MODEM_STATUS_MIN_LEN;
use serde::{Deserialize, Serialize};

/// Transfer buffers per direction
pub const POOL_SIZE: usize = 16;

/// Write buffer size as a multiple of the bulk-out max packet size
pub const WRITE_BUFFER_MULTIPLIER: usize = 20;

/// Read buffer size as a multiple of the bulk-out max packet size
pub const READ_BUFFER_MULTIPLIER: usize = 2;

/// Port number of the control-bearing (modem) interface
pub const MODEM_INTERFACE_NUM: u8 = 4;

/// Default bulk max packet size (high-speed bulk endpoint)
const DEFAULT_MAX_PACKET_SIZE: u16 = 512;

/// Default interrupt endpoint max packet size
const DEFAULT_INTERRUPT_PACKET_SIZE: u16 = 16;

/// Per-port link configuration
///
/// Both buffer sizes derive from the bulk-out endpoint's max packet size; the
/// multipliers are fixed and not recomputed from the read endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Port (interface) number this link serves
    #[serde(default = "LinkConfig::default_port_number")]
    pub port_number: u8,
    /// wMaxPacketSize of the bulk-out endpoint
    #[serde(default = "LinkConfig::default_max_packet_size")]
    pub max_packet_size: u16,
    /// wMaxPacketSize of the interrupt endpoint (size of the notification buffer)
    #[serde(default = "LinkConfig::default_interrupt_packet_size")]
    pub interrupt_packet_size: u16,
    /// Hex-dump every transfer payload at trace level
    #[serde(default)]
    pub trace_data: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            port_number: Self::default_port_number(),
            max_packet_size: Self::default_max_packet_size(),
            interrupt_packet_size: Self::default_interrupt_packet_size(),
            trace_data: false,
        }
    }
}

impl LinkConfig {
    fn default_port_number() -> u8 {
        MODEM_INTERFACE_NUM
    }

    fn default_max_packet_size() -> u16 {
        DEFAULT_MAX_PACKET_SIZE
    }

    fn default_interrupt_packet_size() -> u16 {
        DEFAULT_INTERRUPT_PACKET_SIZE
    }

    pub fn new(port_number: u8, max_packet_size: u16) -> Self {
        Self {
            port_number,
            max_packet_size,
            interrupt_packet_size: Self::default_interrupt_packet_size(),
            trace_data: false,
        }
    }

    pub fn write_buffer_size(&self) -> usize {
        usize::from(self.max_packet_size) * WRITE_BUFFER_MULTIPLIER
    }

    pub fn read_buffer_size(&self) -> usize {
        usize::from(self.max_packet_size) * READ_BUFFER_MULTIPLIER
    }

    pub fn interrupt_buffer_size(&self) -> usize {
        usize::from(self.interrupt_packet_size)
    }

    /// Only the modem port carries the interrupt channel and DTR control
    pub fn is_control_port(&self) -> bool {
        self.port_number == MODEM_INTERFACE_NUM
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        if self.max_packet_size == 0 {
            return Err(LinkError::Config(
                "max_packet_size must be non-zero".to_string(),
            ));
        }
        if self.is_control_port() && self.interrupt_buffer_size() < MODEM_STATUS_MIN_LEN {
            return Err(LinkError::Config(format!(
                "interrupt_packet_size {} cannot hold a {} byte modem status notification",
                self.interrupt_packet_size, MODEM_STATUS_MIN_LEN
            )));
        }
        Ok(())
    }
}

//! Modem device discovery
//!
//! Opens the modem by vendor/product id, finds the bulk and interrupt
//! endpoints of the requested interface and claims it.

use anyhow::{Context, Result, anyhow};
use protocol::Channel;
use rusb::{ConfigDescriptor, DeviceHandle, Direction, TransferType, UsbContext};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// One endpoint of the claimed interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub address: u8,
    pub max_packet_size: u16,
}

/// The endpoints a link needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoints {
    pub bulk_in: Endpoint,
    pub bulk_out: Endpoint,
    /// Only present on interfaces that report modem status
    pub interrupt_in: Option<Endpoint>,
}

impl Endpoints {
    pub fn for_channel(&self, channel: Channel) -> Option<Endpoint> {
        match channel {
            Channel::BulkOut => Some(self.bulk_out),
            Channel::BulkIn => Some(self.bulk_in),
            Channel::Interrupt => self.interrupt_in,
        }
    }
}

/// Endpoint attributes as read from the configuration descriptor
#[derive(Debug, Clone, Copy)]
pub struct EndpointInfo {
    pub address: u8,
    pub transfer_type: TransferType,
    pub direction: Direction,
    pub max_packet_size: u16,
}

/// Pick the first bulk-in, bulk-out and interrupt-in endpoint
pub fn select_endpoints(interface: u8, infos: &[EndpointInfo]) -> Result<Endpoints> {
    let find = |transfer_type: TransferType, direction: Direction| {
        infos
            .iter()
            .find(|e| e.transfer_type == transfer_type && e.direction == direction)
            .map(|e| Endpoint {
                address: e.address,
                max_packet_size: e.max_packet_size,
            })
    };

    let bulk_in = find(TransferType::Bulk, Direction::In)
        .ok_or_else(|| anyhow!("Interface {} has no bulk IN endpoint", interface))?;
    let bulk_out = find(TransferType::Bulk, Direction::Out)
        .ok_or_else(|| anyhow!("Interface {} has no bulk OUT endpoint", interface))?;
    let interrupt_in = find(TransferType::Interrupt, Direction::In);

    Ok(Endpoints {
        bulk_in,
        bulk_out,
        interrupt_in,
    })
}

fn interface_endpoints(config: &ConfigDescriptor, interface: u8) -> Vec<EndpointInfo> {
    config
        .interfaces()
        .filter(|i| i.number() == interface)
        .flat_map(|i| i.descriptors())
        .flat_map(|d| {
            d.endpoint_descriptors()
                .map(|e| EndpointInfo {
                    address: e.address(),
                    transfer_type: e.transfer_type(),
                    direction: e.direction(),
                    max_packet_size: e.max_packet_size(),
                })
                .collect::<Vec<_>>()
        })
        .collect()
}

/// An opened modem with one claimed interface
pub struct ModemDevice {
    handle: Arc<DeviceHandle<rusb::Context>>,
    interface: u8,
    endpoints: Endpoints,
    kernel_driver_detached: bool,
}

impl ModemDevice {
    /// Open the first device matching `vendor_id:product_id` and claim `interface`
    pub fn open(vendor_id: u16, product_id: u16, interface: u8) -> Result<Self> {
        let context = rusb::Context::new().context("Failed to create USB context")?;
        let mut handle = context
            .open_device_with_vid_pid(vendor_id, product_id)
            .ok_or_else(|| anyhow!("No device {:04x}:{:04x} found", vendor_id, product_id))?;

        let config = handle
            .device()
            .active_config_descriptor()
            .context("Failed to get active config descriptor")?;
        let endpoints = select_endpoints(interface, &interface_endpoints(&config, interface))?;
        debug!("Interface {} endpoints: {:?}", interface, endpoints);

        let kernel_driver_detached = match handle.kernel_driver_active(interface) {
            Ok(true) => {
                debug!("Detaching kernel driver from interface {}", interface);
                handle
                    .detach_kernel_driver(interface)
                    .with_context(|| format!("Failed to detach kernel driver from interface {}", interface))?;
                true
            }
            Ok(false) => false,
            Err(e) => {
                debug!(
                    "Could not check kernel driver status for interface {}: {}",
                    interface, e
                );
                false
            }
        };

        if let Err(e) = handle.claim_interface(interface) {
            if kernel_driver_detached {
                let _ = handle.attach_kernel_driver(interface);
            }
            return Err(e).with_context(|| format!("Failed to claim interface {}", interface));
        }

        info!(
            "Opened {:04x}:{:04x} interface {}",
            vendor_id, product_id, interface
        );

        Ok(Self {
            handle: Arc::new(handle),
            interface,
            endpoints,
            kernel_driver_detached,
        })
    }

    pub fn handle(&self) -> Arc<DeviceHandle<rusb::Context>> {
        self.handle.clone()
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    pub fn interface(&self) -> u8 {
        self.interface
    }

    /// Release the interface and give it back to the kernel driver
    ///
    /// Every other holder of the handle must be gone by now.
    pub fn close(self) {
        let mut handle = match Arc::try_unwrap(self.handle) {
            Ok(handle) => handle,
            Err(_) => {
                warn!(
                    "Device handle still in use, leaving interface {} claimed",
                    self.interface
                );
                return;
            }
        };

        if let Err(e) = handle.release_interface(self.interface) {
            warn!("Failed to release interface {}: {}", self.interface, e);
        }

        if self.kernel_driver_detached {
            if let Err(e) = handle.attach_kernel_driver(self.interface) {
                debug!(
                    "Could not reattach kernel driver to interface {}: {}",
                    self.interface, e
                );
            } else {
                debug!("Reattached kernel driver to interface {}", self.interface);
            }
        }

        info!("Closed interface {}", self.interface);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(address: u8, transfer_type: TransferType, direction: Direction, size: u16) -> EndpointInfo {
        EndpointInfo {
            address,
            transfer_type,
            direction,
            max_packet_size: size,
        }
    }

    #[test]
    fn test_select_modem_endpoints() {
        let infos = [
            info(0x87, TransferType::Interrupt, Direction::In, 16),
            info(0x88, TransferType::Bulk, Direction::In, 512),
            info(0x08, TransferType::Bulk, Direction::Out, 512),
        ];

        let endpoints = select_endpoints(4, &infos).unwrap();
        assert_eq!(endpoints.bulk_in.address, 0x88);
        assert_eq!(endpoints.bulk_out.address, 0x08);
        assert_eq!(endpoints.bulk_out.max_packet_size, 512);
        assert_eq!(endpoints.interrupt_in.map(|e| e.address), Some(0x87));
        assert_eq!(endpoints.for_channel(Channel::Interrupt), endpoints.interrupt_in);
    }

    #[test]
    fn test_select_without_interrupt() {
        let infos = [
            info(0x81, TransferType::Bulk, Direction::In, 64),
            info(0x01, TransferType::Bulk, Direction::Out, 64),
        ];

        let endpoints = select_endpoints(1, &infos).unwrap();
        assert!(endpoints.interrupt_in.is_none());
        assert!(endpoints.for_channel(Channel::Interrupt).is_none());
    }

    #[test]
    fn test_select_missing_bulk_out() {
        let infos = [
            info(0x81, TransferType::Bulk, Direction::In, 64),
            info(0x82, TransferType::Interrupt, Direction::In, 16),
        ];

        let err = select_endpoints(4, &infos).unwrap_err();
        assert!(err.to_string().contains("bulk OUT"));
    }
}

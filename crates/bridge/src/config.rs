//! Bridge configuration management

use anyhow::{Context, Result, anyhow};
use link::{LinkConfig, MODEM_INTERFACE_NUM};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default modem identity
pub const DEFAULT_VENDOR_ID: &str = "0x22b8";
pub const DEFAULT_PRODUCT_ID: &str = "0x2a70";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    pub bridge: BridgeSettings,
    #[serde(default)]
    pub device: DeviceSettings,
    #[serde(default)]
    pub link: LinkSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeSettings {
    pub log_level: String,
}

/// Which device and interface to bridge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Vendor ID, e.g. "0x22b8"
    #[serde(default = "DeviceSettings::default_vendor_id")]
    pub vendor_id: String,
    /// Product ID, e.g. "0x2a70"
    #[serde(default = "DeviceSettings::default_product_id")]
    pub product_id: String,
    /// Interface number; the modem port is 4
    #[serde(default = "DeviceSettings::default_interface")]
    pub interface: u8,
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            vendor_id: Self::default_vendor_id(),
            product_id: Self::default_product_id(),
            interface: Self::default_interface(),
        }
    }
}

impl DeviceSettings {
    fn default_vendor_id() -> String {
        DEFAULT_VENDOR_ID.to_string()
    }

    fn default_product_id() -> String {
        DEFAULT_PRODUCT_ID.to_string()
    }

    fn default_interface() -> u8 {
        MODEM_INTERFACE_NUM
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkSettings {
    /// Hex-dump every transfer at trace level
    #[serde(default)]
    pub trace_data: bool,
    /// Raise DTR after open and drop it before close
    #[serde(default = "LinkSettings::default_assert_dtr")]
    pub assert_dtr: bool,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            trace_data: false,
            assert_dtr: Self::default_assert_dtr(),
        }
    }
}

impl LinkSettings {
    fn default_assert_dtr() -> bool {
        true
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge: BridgeSettings {
                log_level: "info".to_string(),
            },
            device: DeviceSettings::default(),
            link: LinkSettings::default(),
        }
    }
}

impl BridgeConfig {
    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/mdm-bridge/bridge.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found, using defaults"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: BridgeConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Failed to load config: {}, using defaults", e);
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("mdm-bridge").join("bridge.toml")
        } else {
            PathBuf::from(".config/mdm-bridge/bridge.toml")
        }
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.bridge.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.bridge.log_level,
                valid_levels.join(", ")
            ));
        }

        parse_hex_id(&self.device.vendor_id, "vendor_id")?;
        parse_hex_id(&self.device.product_id, "product_id")?;
        Ok(())
    }

    pub fn vendor_id(&self) -> Result<u16> {
        parse_hex_id(&self.device.vendor_id, "vendor_id")
    }

    pub fn product_id(&self) -> Result<u16> {
        parse_hex_id(&self.device.product_id, "product_id")
    }

    /// Link settings for the configured interface with the discovered packet sizes
    pub fn link_config(&self, max_packet_size: u16, interrupt_packet_size: Option<u16>) -> LinkConfig {
        let mut config = LinkConfig::new(self.device.interface, max_packet_size);
        if let Some(size) = interrupt_packet_size {
            config.interrupt_packet_size = size;
        }
        config.trace_data = self.link.trace_data;
        config
    }
}

/// Parse a "0x1234"-style USB id
pub fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    let Some(hex_part) = id.strip_prefix("0x").or_else(|| id.strip_prefix("0X")) else {
        return Err(anyhow!(
            "Invalid {} '{}', must start with '0x' (e.g., '0x22b8')",
            name,
            id
        ));
    };

    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

/// Expand a leading `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).as_ref())
}

//! Runtime configuration, loadable from a JSON file and overridden by the
//! command line.

use crate::arinst::{TransferSettings, ARINST_INTERFACE, ARINST_VENDOR_ID};
use crate::device::SpectrumDevice;
use crate::frequency::{Frequency, KHZ, MHZ};
use crate::types::DEFAULT_HISTORY_CAPACITY;
use crate::usb::DeviceFilter;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::Duration;

/// Sweep parameters applied to every newly connected device.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepSettings {
    pub center_frequency: Frequency,
    pub frequency_range: Frequency,
    pub frequency_step: Frequency,
    /// dB, valid range [-30, 0]
    pub attenuation_db: i32,
    /// Tracking-generator scans (`scn22`)
    pub tracking: bool,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            center_frequency: 105.0 * MHZ,
            frequency_range: 100.0 * MHZ,
            frequency_step: 100.0 * KHZ,
            attenuation_db: 0,
            tracking: false,
        }
    }
}

impl SweepSettings {
    /// Apply the window fields. Span goes first so the center is clamped
    /// against the final span.
    pub fn apply_window(&self, device: &mut dyn SpectrumDevice) {
        device.set_frequency_range(self.frequency_range);
        device.set_center_frequency(self.center_frequency);
        device.set_frequency_step(self.frequency_step);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Delay between acquisition iterations
    pub poll_interval_ms: u64,
    /// Discovery tick while not connected
    pub rediscovery_interval_ms: u64,
    pub history_capacity: usize,
    pub vendor_id: u16,
    pub product_id: Option<u16>,
    pub usb_interface: u8,
    pub usb_timeout_ms: u64,
    pub read_chunk: usize,
    pub max_response_bytes: usize,
    /// Substitute the demo device while no hardware is connected
    pub demo: bool,
    pub demo_exchange_delay_ms: u64,
    pub sweep: SweepSettings,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let transfer = TransferSettings::default();
        Self {
            poll_interval_ms: 50,
            rediscovery_interval_ms: 3000,
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            vendor_id: ARINST_VENDOR_ID,
            product_id: None,
            usb_interface: ARINST_INTERFACE,
            usb_timeout_ms: transfer.timeout.as_millis() as u64,
            read_chunk: transfer.read_chunk,
            max_response_bytes: transfer.max_response,
            demo: false,
            demo_exchange_delay_ms: 30,
            sweep: SweepSettings::default(),
        }
    }
}

impl AnalyzerConfig {
    /// Load from a JSON file. Returns None if the file is absent or malformed.
    pub fn load(path: &Path) -> Option<Self> {
        let data = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&data) {
            Ok(c) => {
                info!("Loaded config from {:?}", path);
                Some(c)
            }
            Err(e) => {
                warn!("Failed to parse config file {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn save(&self, path: &Path) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(io::Error::other)?;
        std::fs::write(path, json)?;
        info!("Config saved to {:?}", path);
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn rediscovery_interval(&self) -> Duration {
        Duration::from_millis(self.rediscovery_interval_ms.max(1))
    }

    pub fn device_filter(&self) -> DeviceFilter {
        DeviceFilter {
            vendor_id: self.vendor_id,
            product_id: self.product_id,
        }
    }

    pub fn transfer(&self) -> TransferSettings {
        TransferSettings {
            timeout: Duration::from_millis(self.usb_timeout_ms),
            read_chunk: self.read_chunk,
            max_response: self.max_response_bytes,
        }
    }
}

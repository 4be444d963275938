use crate::device::SpectrumDevice;
use crate::frequency::{FrequencyLimits, FrequencyWindow, KHZ, MHZ};
use crate::protocol::{
    decode_amplitudes, encode_attenuation, encode_scan, is_terminated, parse_scan_response,
    ScanError, ScanRequest, SCAN_COMMAND, TRACKING_SCAN_COMMAND,
};
use crate::types::Sweep;
use crate::usb::{Direction, TransferKind, UsbConnection};
use log::{debug, info, trace};
use std::time::Duration;
use thiserror::Error;

pub const ARINST_VENDOR_ID: u16 = 1155;
/// Interface carrying the bulk endpoints.
pub const ARINST_INTERFACE: u8 = 1;

pub const ARINST_LIMITS: FrequencyLimits = FrequencyLimits {
    min_frequency: 35.0 * MHZ,
    max_frequency: 6200.0 * MHZ,
    max_frequency_range: 6200.0 * MHZ,
    min_frequency_range: 1.0 * MHZ,
};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("could not find both IN and OUT bulk endpoints")]
    MissingEndpoints,
}

/// Transfer tuning for the bulk exchange.
#[derive(Debug, Clone, Copy)]
pub struct TransferSettings {
    pub timeout: Duration,
    /// Size of each bulk read.
    pub read_chunk: usize,
    /// Responses larger than this are abandoned.
    pub max_response: usize,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(1000),
            read_chunk: 1024,
            max_response: 1 << 20,
        }
    }
}

/// Driver for the Arinst SSA handheld analyzer.
///
/// Every command carries a sequence number that starts at 0 and advances
/// once per command sent, whether or not the exchange succeeds.
pub struct ArinstSsa {
    connection: Box<dyn UsbConnection>,
    in_endpoint: u8,
    out_endpoint: u8,
    sequence: u32,
    window: FrequencyWindow,
    attenuation_db: i32,
    tracking: bool,
    transfer: TransferSettings,
}

impl ArinstSsa {
    /// Bind to an opened connection. Fails closed if the claimed interface
    /// lacks a bulk IN or bulk OUT endpoint.
    pub fn new(connection: Box<dyn UsbConnection>) -> Result<Self, DriverError> {
        let mut in_endpoint = None;
        let mut out_endpoint = None;
        for ep in connection.endpoints() {
            if ep.kind != TransferKind::Bulk {
                continue;
            }
            match ep.direction {
                Direction::In => in_endpoint = Some(ep.address),
                Direction::Out => out_endpoint = Some(ep.address),
            }
        }

        let (Some(in_endpoint), Some(out_endpoint)) = (in_endpoint, out_endpoint) else {
            return Err(DriverError::MissingEndpoints);
        };

        info!(
            "Arinst SSA bound: bulk IN 0x{:02X}, bulk OUT 0x{:02X}",
            in_endpoint, out_endpoint
        );

        Ok(Self {
            connection,
            in_endpoint,
            out_endpoint,
            sequence: 0,
            window: FrequencyWindow::new(ARINST_LIMITS, 105.0 * MHZ, 100.0 * MHZ, 100.0 * KHZ),
            attenuation_db: 0,
            tracking: false,
            transfer: TransferSettings::default(),
        })
    }

    pub fn with_transfer(mut self, transfer: TransferSettings) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    pub fn attenuation(&self) -> i32 {
        self.attenuation_db
    }

    /// Out-of-range values are kept; scans are then skipped until fixed.
    pub fn set_attenuation(&mut self, attenuation_db: i32) {
        self.attenuation_db = attenuation_db;
    }

    pub fn tracking(&self) -> bool {
        self.tracking
    }

    pub fn set_tracking(&mut self, tracking: bool) {
        self.tracking = tracking;
    }

    fn command_name(&self) -> &'static str {
        if self.tracking {
            TRACKING_SCAN_COMMAND
        } else {
            SCAN_COMMAND
        }
    }

    /// One scan exchange, with the reason for failure.
    pub fn scan(&mut self) -> Result<Sweep, ScanError> {
        let attenuation_code = encode_attenuation(self.attenuation_db)?;

        let command = self.command_name();
        let start = self.window.start_frequency() as i64;
        let end = self.window.end_frequency() as i64;
        let step = self.window.frequency_step() as i64;

        let msg = encode_scan(&ScanRequest {
            command,
            start,
            end,
            step,
            attenuation_code,
            sequence: self.sequence,
        });
        trace!("→ {}", String::from_utf8_lossy(&msg).trim_end());

        let written = self
            .connection
            .write_bulk(self.out_endpoint, &msg, self.transfer.timeout);
        self.sequence = self.sequence.wrapping_add(1);
        let written = written?;
        if written != msg.len() {
            return Err(ScanError::ShortWrite {
                written,
                expected: msg.len(),
            });
        }

        let response = self.read_response()?;
        let payload = parse_scan_response(&response, command)?;
        Ok(decode_amplitudes(payload, start as f64, step as f64))
    }

    /// Accumulate bulk reads until CR LF ends the buffer or a read returns
    /// nothing.
    fn read_response(&mut self) -> Result<Vec<u8>, ScanError> {
        let mut chunk = vec![0u8; self.transfer.read_chunk.max(1)];
        let mut response = Vec::new();
        loop {
            let n = self
                .connection
                .read_bulk(self.in_endpoint, &mut chunk, self.transfer.timeout)?;
            if n == 0 {
                break;
            }
            response.extend_from_slice(&chunk[..n.min(chunk.len())]);
            if response.len() > self.transfer.max_response {
                return Err(ScanError::Oversize(self.transfer.max_response));
            }
            if is_terminated(&response) {
                break;
            }
        }
        Ok(response)
    }
}

impl SpectrumDevice for ArinstSsa {
    fn device_name(&self) -> &str {
        "Arinst SSA"
    }

    fn window(&self) -> &FrequencyWindow {
        &self.window
    }

    fn window_mut(&mut self) -> &mut FrequencyWindow {
        &mut self.window
    }

    fn get_amplitudes(&mut self) -> Option<Sweep> {
        match self.scan() {
            Ok(sweep) => Some(sweep),
            Err(e) => {
                debug!("Scan dropped (next seq {}): {}", self.sequence, e);
                None
            }
        }
    }
}

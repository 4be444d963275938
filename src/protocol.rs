//! Text protocol spoken by the Arinst SSA family over its bulk endpoints.
//!
//! Command (ASCII, space separated):
//!
//!   `<cmd> <start> <end> <step> 200 20 10700000 <atten> <seq>\r\n`
//!
//! Response:
//!
//!   `\r\n<cmd> ...\r\n<payload><3-byte marker>\r\ncomplete\r\n`
//!
//! Payload is two bytes per point; only the low 3 bits of the first byte
//! are significant.

use crate::frequency::Frequency;
use crate::types::{SignalData, Sweep};
use crate::usb::UsbError;
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;
use thiserror::Error;

pub const TERMINATOR: &[u8; 2] = b"\r\n";
pub const SCAN_COMMAND: &str = "scn20";
pub const TRACKING_SCAN_COMMAND: &str = "scn22";
pub const COMPLETE_MARKER: &str = "complete";

/// Device-specific fixed scan parameters.
pub const SCAN_FIXED_A: i64 = 200;
pub const SCAN_FIXED_B: i64 = 20;
/// Intermediate frequency, Hz.
pub const INTERMEDIATE_FREQUENCY: i64 = 10_700_000;

pub const MIN_ATTENUATION_DB: i32 = -30;
pub const MAX_ATTENUATION_DB: i32 = 0;

/// Calibration constants of the device: dB = index / DIVISOR + OFFSET.
const AMPLITUDE_DIVISOR: f32 = -10.0;
const AMPLITUDE_OFFSET: f32 = 80.0;

/// Bytes between the payload and the terminator that precedes "complete".
const TRAILING_MARKER_LEN: usize = 3;

/// Why a scan produced no sweep.
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("attenuation {0} dB outside [-30, 0]")]
    AttenuationOutOfRange(i32),

    #[error("short write: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },

    #[error("transport: {0}")]
    Transport(#[from] UsbError),

    #[error("response exceeds {0} bytes")]
    Oversize(usize),

    #[error("bad framing: {0}")]
    Framing(String),
}

/// Parameters of one scan command.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanRequest<'a> {
    pub command: &'a str,
    pub start: i64,
    pub end: i64,
    pub step: i64,
    pub attenuation_code: i64,
    pub sequence: u32,
}

/// Wire value for an attenuation in dB, or an error if out of range.
pub fn encode_attenuation(attenuation_db: i32) -> Result<i64, ScanError> {
    if !(MIN_ATTENUATION_DB..=MAX_ATTENUATION_DB).contains(&attenuation_db) {
        return Err(ScanError::AttenuationOutOfRange(attenuation_db));
    }
    Ok(attenuation_db as i64 * 100 + 10_000)
}

pub fn encode_command(name: &str, args: &[i64], sequence: u32) -> Vec<u8> {
    let mut msg = String::from(name);
    for arg in args {
        msg.push(' ');
        msg.push_str(&arg.to_string());
    }
    msg.push(' ');
    msg.push_str(&sequence.to_string());
    let mut bytes = msg.into_bytes();
    bytes.extend_from_slice(TERMINATOR);
    bytes
}

pub fn encode_scan(req: &ScanRequest<'_>) -> Vec<u8> {
    encode_command(
        req.command,
        &[
            req.start,
            req.end,
            req.step,
            SCAN_FIXED_A,
            SCAN_FIXED_B,
            INTERMEDIATE_FREQUENCY,
            req.attenuation_code,
        ],
        req.sequence,
    )
}

/// True once the accumulated response ends in CR LF.
pub fn is_terminated(buf: &[u8]) -> bool {
    buf.ends_with(TERMINATOR)
}

fn terminator_positions(buf: &[u8]) -> Vec<usize> {
    buf.windows(2)
        .enumerate()
        .filter(|(_, w)| *w == TERMINATOR)
        .map(|(i, _)| i)
        .collect()
}

/// Extract the binary payload from a framed scan response.
///
/// The response must contain exactly four CR LF sequences, the echo header
/// must start with `command`, and the last segment must be "complete".
pub fn parse_scan_response<'a>(response: &'a [u8], command: &str) -> Result<&'a [u8], ScanError> {
    let rn = terminator_positions(response);
    if rn.len() != 4 {
        return Err(ScanError::Framing(format!(
            "expected 4 CR LF sequences, found {}",
            rn.len()
        )));
    }

    let header = &response[rn[0] + 2..rn[1]];
    if !header.starts_with(command.as_bytes()) {
        return Err(ScanError::Framing(format!(
            "header {:?} does not echo {}",
            String::from_utf8_lossy(header),
            command
        )));
    }

    let complete = &response[rn[2] + 2..rn[3]];
    if complete != COMPLETE_MARKER.as_bytes() {
        return Err(ScanError::Framing(format!(
            "missing completion marker, got {:?}",
            String::from_utf8_lossy(complete)
        )));
    }

    let payload_start = rn[1] + 2;
    let payload_end = rn[2]
        .checked_sub(TRAILING_MARKER_LEN)
        .filter(|&end| end >= payload_start)
        .ok_or_else(|| ScanError::Framing("payload shorter than trailing marker".into()))?;

    Ok(&response[payload_start..payload_end])
}

/// Decode two-byte amplitude indices into a sweep.
///
/// An odd trailing byte is decoded as if followed by 0x00.
pub fn decode_amplitudes(payload: &[u8], start: Frequency, step: Frequency) -> Sweep {
    let mut padded;
    let bytes = if payload.len() % 2 == 1 {
        padded = payload.to_vec();
        padded.push(0);
        &padded[..]
    } else {
        payload
    };

    let mut cursor = Cursor::new(bytes);
    let mut sweep = Vec::with_capacity(bytes.len() / 2);
    let mut pair_index = 0usize;
    while let Ok(word) = cursor.read_u16::<BigEndian>() {
        let index = word & 0x07FF;
        let amplitude = index as f32 / AMPLITUDE_DIVISOR + AMPLITUDE_OFFSET;
        let frequency = start + pair_index as Frequency * step;
        sweep.push(SignalData::new(frequency, amplitude));
        pair_index += 1;
    }
    sweep
}

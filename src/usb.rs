//! The USB host capability the lifecycle manager drives.
//!
//! Enumeration, permission and opening live behind [`UsbHost`]; bulk I/O on
//! an opened device lives behind [`UsbConnection`]. Asynchronous host
//! notifications (permission results, detach) arrive as [`HostEvent`]s on a
//! channel consumed by the lifecycle thread.

use std::fmt;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UsbError {
    #[error("USB transfer timed out")]
    Timeout,

    #[error("access denied")]
    Access,

    #[error("device disconnected")]
    NoDevice,

    #[error("device not found")]
    NotFound,

    #[error("USB error: {0}")]
    Other(String),
}

#[cfg(feature = "hardware")]
impl From<rusb::Error> for UsbError {
    fn from(e: rusb::Error) -> Self {
        match e {
            rusb::Error::Timeout => UsbError::Timeout,
            rusb::Error::Access => UsbError::Access,
            rusb::Error::NoDevice => UsbError::NoDevice,
            rusb::Error::NotFound => UsbError::NotFound,
            other => UsbError::Other(other.to_string()),
        }
    }
}

/// An enumerated device, identified by its bus position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsbDeviceInfo {
    pub bus: u8,
    pub address: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl UsbDeviceInfo {
    pub fn same_port(&self, other: &UsbDeviceInfo) -> bool {
        self.bus == other.bus && self.address == other.address
    }
}

impl fmt::Display for UsbDeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bus {:03} Device {:03} ({:04x}:{:04x})",
            self.bus, self.address, self.vendor_id, self.product_id
        )
    }
}

/// Which devices count as the supported hardware family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFilter {
    pub vendor_id: u16,
    /// Stricter matching when set.
    pub product_id: Option<u16>,
}

impl DeviceFilter {
    pub fn matches(&self, info: &UsbDeviceInfo) -> bool {
        info.vendor_id == self.vendor_id
            && self.product_id.map_or(true, |pid| info.product_id == pid)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Control,
    Isochronous,
    Bulk,
    Interrupt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointInfo {
    pub address: u8,
    pub direction: Direction,
    pub kind: TransferKind,
}

/// An opened device with one claimed interface.
pub trait UsbConnection: Send {
    /// Endpoints of the claimed interface.
    fn endpoints(&self) -> Vec<EndpointInfo>;

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, UsbError>;

    /// Returns the number of bytes read; 0 means end of stream.
    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError>;
}

/// Host-side USB operations.
pub trait UsbHost: Send {
    fn devices(&self) -> Result<Vec<UsbDeviceInfo>, UsbError>;

    fn has_permission(&self, device: &UsbDeviceInfo) -> bool;

    /// Ask for access. The outcome arrives later as
    /// [`HostEvent::Permission`].
    fn request_permission(&self, device: &UsbDeviceInfo);

    fn open(&self, device: &UsbDeviceInfo, interface: u8) -> Result<Box<dyn UsbConnection>, UsbError>;
}

/// Asynchronous notifications from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostEvent {
    Permission { device: UsbDeviceInfo, granted: bool },
    Detached { device: UsbDeviceInfo },
}

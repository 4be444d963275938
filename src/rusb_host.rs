//! libusb-backed [`UsbHost`] (requires the `hardware` feature).

use crate::usb::{
    DeviceFilter, Direction, EndpointInfo, HostEvent, TransferKind, UsbConnection, UsbDeviceInfo,
    UsbError, UsbHost,
};
use crossbeam_channel::Sender;
use log::{debug, info, warn};
use rusb::{Context, Device, DeviceHandle, Hotplug, HotplugBuilder, UsbContext};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// How long one libusb event-handling pass may block.
const EVENT_POLL: Duration = Duration::from_millis(250);

pub struct RusbHost {
    context: Context,
    events: Sender<HostEvent>,
    stop: Arc<AtomicBool>,
    event_thread: Option<JoinHandle<()>>,
    permission_hint_shown: AtomicBool,
}

impl RusbHost {
    /// Open a libusb context and start watching for detaches of devices
    /// matching `filter`.
    pub fn new(filter: DeviceFilter, events: Sender<HostEvent>) -> Result<Self, UsbError> {
        let context = Context::new()?;
        let stop = Arc::new(AtomicBool::new(false));

        let event_thread = {
            let context = context.clone();
            let events = events.clone();
            let stop = stop.clone();
            thread::Builder::new()
                .name("usb-events".into())
                .spawn(move || watch_detaches(context, filter, events, stop))
                .map_err(|e| UsbError::Other(e.to_string()))?
        };

        Ok(Self {
            context,
            events,
            stop,
            event_thread: Some(event_thread),
            permission_hint_shown: AtomicBool::new(false),
        })
    }

    fn find(&self, info: &UsbDeviceInfo) -> Result<Device<Context>, UsbError> {
        self.context
            .devices()?
            .iter()
            .find(|d| d.bus_number() == info.bus && d.address() == info.address)
            .ok_or(UsbError::NotFound)
    }
}

impl Drop for RusbHost {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.event_thread.take() {
            let _ = handle.join();
        }
    }
}

fn describe(device: &Device<Context>) -> Option<UsbDeviceInfo> {
    let desc = device.device_descriptor().ok()?;
    Some(UsbDeviceInfo {
        bus: device.bus_number(),
        address: device.address(),
        vendor_id: desc.vendor_id(),
        product_id: desc.product_id(),
    })
}

impl UsbHost for RusbHost {
    fn devices(&self) -> Result<Vec<UsbDeviceInfo>, UsbError> {
        Ok(self.context.devices()?.iter().filter_map(|d| describe(&d)).collect())
    }

    /// libusb has no separate permission query; a trial open answers it.
    fn has_permission(&self, info: &UsbDeviceInfo) -> bool {
        match self.find(info).and_then(|d| d.open().map_err(UsbError::from)) {
            Ok(_) => true,
            Err(UsbError::Access) => false,
            Err(e) => {
                debug!("Permission probe for {} failed: {}", info, e);
                true
            }
        }
    }

    /// Access on desktop hosts is granted out of band (udev rules), so the
    /// request is answered immediately.
    fn request_permission(&self, info: &UsbDeviceInfo) {
        if !self.permission_hint_shown.swap(true, Ordering::Relaxed) {
            warn!(
                "No access to {}. Add a udev rule such as \
                 SUBSYSTEM==\"usb\", ATTR{{idVendor}}==\"{:04x}\", MODE=\"0666\" and replug the device",
                info, info.vendor_id
            );
        }
        let _ = self.events.send(HostEvent::Permission {
            device: info.clone(),
            granted: false,
        });
    }

    fn open(&self, info: &UsbDeviceInfo, interface: u8) -> Result<Box<dyn UsbConnection>, UsbError> {
        let device = self.find(info)?;
        let handle = device.open()?;

        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("Kernel driver auto-detach unavailable: {}", e);
        }
        handle.claim_interface(interface)?;

        let endpoints = interface_endpoints(&device, interface)?;
        info!("Opened {} (interface {}, {} endpoints)", info, interface, endpoints.len());

        Ok(Box::new(RusbConnection {
            handle,
            interface,
            endpoints,
        }))
    }
}

fn interface_endpoints(device: &Device<Context>, interface: u8) -> Result<Vec<EndpointInfo>, UsbError> {
    let config = device.active_config_descriptor()?;
    let mut endpoints = Vec::new();
    for iface in config.interfaces().filter(|i| i.number() == interface) {
        for desc in iface.descriptors() {
            for ep in desc.endpoint_descriptors() {
                endpoints.push(EndpointInfo {
                    address: ep.address(),
                    direction: match ep.direction() {
                        rusb::Direction::In => Direction::In,
                        rusb::Direction::Out => Direction::Out,
                    },
                    kind: match ep.transfer_type() {
                        rusb::TransferType::Control => TransferKind::Control,
                        rusb::TransferType::Isochronous => TransferKind::Isochronous,
                        rusb::TransferType::Bulk => TransferKind::Bulk,
                        rusb::TransferType::Interrupt => TransferKind::Interrupt,
                    },
                });
            }
        }
    }
    Ok(endpoints)
}

// ─── Connection ─────────────────────────────────────────────────────────────

pub struct RusbConnection {
    handle: DeviceHandle<Context>,
    interface: u8,
    endpoints: Vec<EndpointInfo>,
}

impl UsbConnection for RusbConnection {
    fn endpoints(&self) -> Vec<EndpointInfo> {
        self.endpoints.clone()
    }

    fn write_bulk(&mut self, endpoint: u8, data: &[u8], timeout: Duration) -> Result<usize, UsbError> {
        Ok(self.handle.write_bulk(endpoint, data, timeout)?)
    }

    fn read_bulk(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize, UsbError> {
        Ok(self.handle.read_bulk(endpoint, buf, timeout)?)
    }
}

impl Drop for RusbConnection {
    fn drop(&mut self) {
        if let Err(e) = self.handle.release_interface(self.interface) {
            debug!("Release of interface {} failed: {}", self.interface, e);
        }
    }
}

// ─── Detach notifications ───────────────────────────────────────────────────

struct DetachWatcher {
    filter: DeviceFilter,
    events: Sender<HostEvent>,
}

impl Hotplug<Context> for DetachWatcher {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!("USB device arrived: bus {} address {}", device.bus_number(), device.address());
    }

    fn device_left(&mut self, device: Device<Context>) {
        // The descriptor may already be gone; the registration filter
        // guarantees the vendor.
        let info = describe(&device).unwrap_or(UsbDeviceInfo {
            bus: device.bus_number(),
            address: device.address(),
            vendor_id: self.filter.vendor_id,
            product_id: self.filter.product_id.unwrap_or(0),
        });
        let _ = self.events.send(HostEvent::Detached { device: info });
    }
}

fn watch_detaches(context: Context, filter: DeviceFilter, events: Sender<HostEvent>, stop: Arc<AtomicBool>) {
    if rusb::has_hotplug() {
        let registration = HotplugBuilder::new()
            .vendor_id(filter.vendor_id)
            .enumerate(false)
            .register(&context, Box::new(DetachWatcher { filter, events: events.clone() }));

        match registration {
            Ok(_registration) => {
                debug!("USB hotplug watcher registered");
                while !stop.load(Ordering::Relaxed) {
                    if let Err(e) = context.handle_events(Some(EVENT_POLL)) {
                        warn!("libusb event handling failed: {}", e);
                        thread::sleep(EVENT_POLL);
                    }
                }
                return;
            }
            Err(e) => warn!("Hotplug registration failed ({}), polling for detaches", e),
        }
    } else {
        info!("libusb hotplug unsupported, polling for detaches");
    }

    poll_detaches(context, filter, events, stop);
}

/// Fallback: diff the matching devices on every pass.
fn poll_detaches(context: Context, filter: DeviceFilter, events: Sender<HostEvent>, stop: Arc<AtomicBool>) {
    let present = |ctx: &Context| -> Vec<UsbDeviceInfo> {
        ctx.devices()
            .map(|list| {
                list.iter()
                    .filter_map(|d| describe(&d))
                    .filter(|d| filter.matches(d))
                    .collect()
            })
            .unwrap_or_default()
    };

    let mut seen = present(&context);
    while !stop.load(Ordering::Relaxed) {
        thread::sleep(EVENT_POLL);
        let now = present(&context);
        let ports: HashSet<(u8, u8)> = now.iter().map(|d| (d.bus, d.address)).collect();
        for gone in seen.iter().filter(|d| !ports.contains(&(d.bus, d.address))) {
            let _ = events.send(HostEvent::Detached { device: gone.clone() });
        }
        seen = now;
    }
}

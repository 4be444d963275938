use crate::arinst::{ArinstSsa, TransferSettings};
use crate::config::{AnalyzerConfig, SweepSettings};
use crate::device::{into_active, DeviceSlot};
use crate::monitor::Monitor;
use crate::types::ConnectionStatus;
use crate::usb::{DeviceFilter, HostEvent, UsbDeviceInfo, UsbHost};
use crossbeam_channel::{never, select, tick, Receiver};
use log::{debug, info, trace, warn};
use std::time::Duration;

/// Discovers, connects and tracks the one supported hardware device.
///
/// ```text
///   Waiting ──tick, no permission──▶ Connecting ──granted, opened──▶ Connected
///      ▲                                 │                              │
///      │                          denied / open failed                  │
///      │                                 ▼                              │
///      └─────────next tick────────── Failed                             │
///      └───────────────────────────── detach ◀──────────────────────────┘
/// ```
///
/// Timer ticks and host notifications are handled on the same thread, so
/// at most one connect attempt is ever in flight.
pub struct LifecycleManager {
    host: Box<dyn UsbHost>,
    events: Receiver<HostEvent>,
    slot: DeviceSlot,
    monitor: Monitor,
    filter: DeviceFilter,
    interface: u8,
    transfer: TransferSettings,
    sweep: SweepSettings,
    rediscovery: Duration,
    connected: Option<UsbDeviceInfo>,
    /// Device with an outstanding permission request.
    pending_permission: Option<UsbDeviceInfo>,
    /// Matching devices that failed to open or drive; skipped until every
    /// candidate has failed once.
    rejected: Vec<UsbDeviceInfo>,
}

impl LifecycleManager {
    pub fn new(
        host: Box<dyn UsbHost>,
        events: Receiver<HostEvent>,
        slot: DeviceSlot,
        monitor: Monitor,
        config: &AnalyzerConfig,
    ) -> Self {
        Self {
            host,
            events,
            slot,
            monitor,
            filter: config.device_filter(),
            interface: config.usb_interface,
            transfer: config.transfer(),
            sweep: config.sweep,
            rediscovery: config.rediscovery_interval(),
            connected: None,
            pending_permission: None,
            rejected: Vec::new(),
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        self.monitor.status()
    }

    pub fn connected_device(&self) -> Option<&UsbDeviceInfo> {
        self.connected.as_ref()
    }

    /// Run until `shutdown` fires or disconnects. Blocks the calling thread.
    pub fn run(&mut self, shutdown: Receiver<()>) {
        info!(
            "Lifecycle manager running (vendor {:04x}, rediscovery every {:?})",
            self.filter.vendor_id, self.rediscovery
        );
        let ticker = tick(self.rediscovery);
        let mut events = self.events.clone();

        self.poll();
        loop {
            select! {
                recv(events) -> msg => match msg {
                    Ok(event) => self.handle_event(event),
                    Err(_) => {
                        debug!("Host notification channel closed");
                        events = never();
                    }
                },
                recv(ticker) -> _ => self.poll(),
                recv(shutdown) -> _ => break,
            }
        }

        if self.slot.clear() {
            info!("Released hardware device on shutdown");
        }
        info!("Lifecycle manager shutting down");
    }

    /// One discovery tick. Does nothing while connected.
    pub fn poll(&mut self) {
        if self.connected.is_some() {
            return;
        }
        if self.status() == ConnectionStatus::Failed {
            self.set_status(ConnectionStatus::Waiting);
        }

        let devices = match self.host.devices() {
            Ok(d) => d,
            Err(e) => {
                warn!("USB enumeration failed: {}", e);
                return;
            }
        };
        let candidates: Vec<UsbDeviceInfo> =
            devices.into_iter().filter(|d| self.filter.matches(d)).collect();
        if candidates.is_empty() {
            trace!("No supported device attached");
            return;
        }
        if candidates
            .iter()
            .all(|c| self.rejected.iter().any(|r| r.same_port(c)))
        {
            self.rejected.clear();
        }
        let Some(candidate) = candidates
            .into_iter()
            .find(|c| !self.rejected.iter().any(|r| r.same_port(c)))
        else {
            return;
        };

        if !self.host.has_permission(&candidate) {
            let already_asked = self
                .pending_permission
                .as_ref()
                .is_some_and(|p| p.same_port(&candidate));
            if !already_asked {
                info!("Permission missing for {}, requesting...", candidate);
                self.host.request_permission(&candidate);
                self.pending_permission = Some(candidate);
            }
            self.set_status(ConnectionStatus::Connecting);
            return;
        }

        self.connect(candidate);
    }

    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Permission { device, granted } => {
                if self
                    .pending_permission
                    .as_ref()
                    .is_some_and(|p| p.same_port(&device))
                {
                    self.pending_permission = None;
                }
                if self.connected.is_some() {
                    debug!("Ignoring permission result for {} while connected", device);
                    return;
                }
                if granted {
                    info!("Permission granted for {}", device);
                    self.connect(device);
                } else {
                    info!("Permission denied for {}", device);
                    self.set_status(ConnectionStatus::Failed);
                }
            }
            HostEvent::Detached { device } => {
                info!("Device detached: {}", device);
                if self
                    .pending_permission
                    .as_ref()
                    .is_some_and(|p| p.same_port(&device))
                {
                    self.pending_permission = None;
                }
                self.rejected.retain(|r| !r.same_port(&device));
                self.slot.clear();
                self.connected = None;
                self.set_status(ConnectionStatus::Waiting);
            }
        }
    }

    fn connect(&mut self, device: UsbDeviceInfo) {
        self.set_status(ConnectionStatus::Connecting);

        if !self.filter.matches(&device) {
            info!("Unsupported device {}", device);
            self.set_status(ConnectionStatus::Failed);
            return;
        }

        let connection = match self.host.open(&device, self.interface) {
            Ok(c) => c,
            Err(e) => {
                warn!("Failed to open {}: {}", device, e);
                self.reject(device);
                self.set_status(ConnectionStatus::Failed);
                return;
            }
        };

        let mut driver = match ArinstSsa::new(connection) {
            Ok(d) => d.with_transfer(self.transfer),
            Err(e) => {
                warn!("Cannot drive {}: {}", device, e);
                self.reject(device);
                self.set_status(ConnectionStatus::Failed);
                return;
            }
        };
        driver.set_attenuation(self.sweep.attenuation_db);
        driver.set_tracking(self.sweep.tracking);
        self.sweep.apply_window(&mut driver);

        self.slot.install(into_active(Box::new(driver)));
        info!("Connected to {}", device);
        self.rejected.retain(|r| !r.same_port(&device));
        self.connected = Some(device);
        self.set_status(ConnectionStatus::Connected);
    }

    fn reject(&mut self, device: UsbDeviceInfo) {
        if !self.rejected.iter().any(|r| r.same_port(&device)) {
            self.rejected.push(device);
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        let previous = self.monitor.status();
        if previous != status {
            debug!("Connection status {} → {}", previous, status);
            self.monitor.set_status(status);
        }
    }
}


#[cfg(test)]
mod tests {
    use super::test_helpers::*;
    use super::*;
    use crate::frequency::MHZ;
    use crate::usb::Direction;
    use crossbeam_channel::unbounded;

    fn manager(host: &FakeHost, events: Receiver<HostEvent>, config: &AnalyzerConfig) -> (LifecycleManager, DeviceSlot, Monitor) {
        let slot = DeviceSlot::new();
        let monitor = Monitor::new(10);
        let m = LifecycleManager::new(Box::new(host.clone()), events, slot.clone(), monitor.clone(), config);
        (m, slot, monitor)
    }

    fn setup() -> (FakeHost, LifecycleManager, DeviceSlot, Monitor) {
        let (tx, rx) = unbounded();
        let host = FakeHost::new(tx);
        let (m, slot, monitor) = manager(&host, rx, &AnalyzerConfig::default());
        (host, m, slot, monitor)
    }

    #[test]
    fn test_no_device_stays_waiting() {
        let (_host, mut m, slot, monitor) = setup();
        m.poll();
        assert_eq!(monitor.status(), ConnectionStatus::Waiting);
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_foreign_devices_ignored() {
        let (host, mut m, slot, _) = setup();
        host.attach(UsbDeviceInfo {
            bus: 1,
            address: 2,
            vendor_id: 0x1d50,
            product_id: 0x60a1,
        });
        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Waiting);
        assert_eq!(*host.opens.lock().unwrap(), 0);
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_connects_when_permitted() {
        let (host, mut m, slot, _) = setup();
        host.attach(arinst_at(3));
        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Connected);
        assert!(slot.is_occupied());
        assert_eq!(m.connected_device(), Some(&arinst_at(3)));

        // Further ticks do not reopen.
        m.poll();
        assert_eq!(*host.opens.lock().unwrap(), 1);
    }

    #[test]
    fn test_sweep_settings_applied_on_connect() {
        let (tx, rx) = unbounded();
        let host = FakeHost::new(tx);
        let mut config = AnalyzerConfig::default();
        config.sweep.center_frequency = 433.92 * MHZ;
        config.sweep.frequency_range = 2.0 * MHZ;
        let (mut m, slot, _) = manager(&host, rx, &config);
        host.attach(arinst_at(3));
        m.poll();
        let (center, range) = slot
            .with_current(|d| (d.center_frequency(), d.frequency_range()))
            .unwrap();
        assert_eq!(center, 433.92 * MHZ);
        assert_eq!(range, 2.0 * MHZ);
    }

    #[test]
    fn test_permission_request_then_grant() {
        let (host, mut m, slot, _) = setup();
        *host.permitted.lock().unwrap() = false;
        host.attach(arinst_at(3));

        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Connecting);
        assert_eq!(*host.requests.lock().unwrap(), 1);

        // A pending request is not repeated on the next tick.
        m.poll();
        assert_eq!(*host.requests.lock().unwrap(), 1);
        assert!(!slot.is_occupied());

        m.handle_event(HostEvent::Permission {
            device: arinst_at(3),
            granted: true,
        });
        assert_eq!(m.status(), ConnectionStatus::Connected);
        assert!(slot.is_occupied());
    }

    #[test]
    fn test_permission_denied_fails_then_retries() {
        let (host, mut m, _, _) = setup();
        *host.permitted.lock().unwrap() = false;
        host.attach(arinst_at(3));
        m.poll();
        m.handle_event(HostEvent::Permission {
            device: arinst_at(3),
            granted: false,
        });
        assert_eq!(m.status(), ConnectionStatus::Failed);

        // Next tick leaves Failed and asks again.
        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Connecting);
        assert_eq!(*host.requests.lock().unwrap(), 2);
    }

    #[test]
    fn test_grant_for_unrecognized_device_fails() {
        let (_host, mut m, slot, _) = setup();
        m.handle_event(HostEvent::Permission {
            device: UsbDeviceInfo {
                bus: 2,
                address: 9,
                vendor_id: 0x046d,
                product_id: 0xc077,
            },
            granted: true,
        });
        assert_eq!(m.status(), ConnectionStatus::Failed);
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_product_id_filter_rejects_other_product() {
        let (tx, rx) = unbounded();
        let host = FakeHost::new(tx);
        let mut config = AnalyzerConfig::default();
        config.product_id = Some(0x1234);
        let (mut m, _, _) = manager(&host, rx, &config);
        host.attach(arinst_at(3));
        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Waiting);
        m.handle_event(HostEvent::Permission {
            device: arinst_at(3),
            granted: true,
        });
        assert_eq!(m.status(), ConnectionStatus::Failed);
    }

    #[test]
    fn test_open_failure_fails() {
        let (host, mut m, slot, _) = setup();
        *host.open_fails.lock().unwrap() = true;
        host.attach(arinst_at(3));
        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Failed);
        assert!(!slot.is_occupied());

        *host.open_fails.lock().unwrap() = false;
        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Connected);
    }

    #[test]
    fn test_missing_endpoints_fails_closed() {
        let (tx, rx) = unbounded();
        let mut host = FakeHost::new(tx);
        host.connection.endpoints.retain(|e| e.direction == Direction::Out);
        let (mut m, slot, _) = manager(&host, rx, &AnalyzerConfig::default());
        host.attach(arinst_at(3));
        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Failed);
        assert!(!slot.is_occupied());
    }

    #[test]
    fn test_failed_device_skipped_for_next_candidate() {
        let (host, mut m, slot, _) = setup();
        host.bulkless.lock().unwrap().push(3);
        host.attach(arinst_at(3));
        host.attach(arinst_at(4));

        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Failed);
        assert!(!slot.is_occupied());

        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Connected);
        assert_eq!(m.connected_device(), Some(&arinst_at(4)));
        assert_eq!(*host.opens.lock().unwrap(), 2);
    }

    #[test]
    fn test_every_candidate_failed_starts_over() {
        let (host, mut m, _, _) = setup();
        host.bulkless.lock().unwrap().extend([3, 4]);
        host.attach(arinst_at(3));
        host.attach(arinst_at(4));
        m.poll();
        m.poll();
        assert_eq!(*host.opens.lock().unwrap(), 2);

        host.bulkless.lock().unwrap().clear();
        m.poll();
        assert_eq!(m.connected_device(), Some(&arinst_at(3)));
    }

    #[test]
    fn test_detach_drops_device_and_waits() {
        let (host, mut m, slot, _) = setup();
        host.attach(arinst_at(3));
        m.poll();
        assert!(slot.is_occupied());

        m.handle_event(HostEvent::Detached {
            device: arinst_at(3),
        });
        assert_eq!(m.status(), ConnectionStatus::Waiting);
        assert!(!slot.is_occupied());
        assert!(m.connected_device().is_none());
    }

    #[test]
    fn test_detach_from_failed_goes_straight_to_waiting() {
        let (host, mut m, _, _) = setup();
        *host.open_fails.lock().unwrap() = true;
        host.attach(arinst_at(3));
        m.poll();
        assert_eq!(m.status(), ConnectionStatus::Failed);
        m.handle_event(HostEvent::Detached {
            device: arinst_at(3),
        });
        assert_eq!(m.status(), ConnectionStatus::Waiting);
    }

    #[test]
    fn test_grant_ignored_while_connected() {
        let (host, mut m, _, _) = setup();
        host.attach(arinst_at(3));
        m.poll();
        m.handle_event(HostEvent::Permission {
            device: arinst_at(4),
            granted: true,
        });
        assert_eq!(*host.opens.lock().unwrap(), 1);
        assert_eq!(m.connected_device(), Some(&arinst_at(3)));
    }
}

//! The contract every device variant implements, and the shared cell that
//! holds whichever hardware device is currently connected.

use crate::frequency::{Frequency, FrequencyWindow};
use crate::types::Sweep;
use log::debug;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

/// A spectrum source: real hardware or the synthetic demo generator.
///
/// Frequency setters clamp instead of failing; see [`FrequencyWindow`].
pub trait SpectrumDevice: Send {
    fn device_name(&self) -> &str;

    fn window(&self) -> &FrequencyWindow;
    fn window_mut(&mut self) -> &mut FrequencyWindow;

    /// Perform one full scan. Blocks for the duration of the I/O exchange.
    ///
    /// `None` means "no usable data this cycle", never a fatal condition.
    fn get_amplitudes(&mut self) -> Option<Sweep>;

    fn min_frequency(&self) -> Frequency {
        self.window().limits().min_frequency
    }

    fn max_frequency(&self) -> Frequency {
        self.window().limits().max_frequency
    }

    fn max_frequency_range(&self) -> Frequency {
        self.window().limits().max_frequency_range
    }

    fn center_frequency(&self) -> Frequency {
        self.window().center_frequency()
    }

    fn set_center_frequency(&mut self, value: Frequency) {
        self.window_mut().set_center_frequency(value);
    }

    fn frequency_range(&self) -> Frequency {
        self.window().frequency_range()
    }

    fn set_frequency_range(&mut self, value: Frequency) {
        self.window_mut().set_frequency_range(value);
    }

    fn frequency_step(&self) -> Frequency {
        self.window().frequency_step()
    }

    fn set_frequency_step(&mut self, value: Frequency) {
        self.window_mut().set_frequency_step(value);
    }

    fn start_frequency(&self) -> Frequency {
        self.window().start_frequency()
    }

    fn set_start_frequency(&mut self, value: Frequency) {
        self.window_mut().set_start_frequency(value);
    }

    fn end_frequency(&self) -> Frequency {
        self.window().end_frequency()
    }

    fn set_end_frequency(&mut self, value: Frequency) {
        self.window_mut().set_end_frequency(value);
    }
}

/// Shared handle to one device instance.
pub type ActiveDevice = Arc<Mutex<Box<dyn SpectrumDevice>>>;

pub fn into_active(device: Box<dyn SpectrumDevice>) -> ActiveDevice {
    Arc::new(Mutex::new(device))
}

/// Lock a device, recovering from a poisoned mutex (a panicking scan must
/// not take the whole pipeline down with it).
pub fn lock_device(device: &ActiveDevice) -> MutexGuard<'_, Box<dyn SpectrumDevice>> {
    device.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The currently connected hardware device, if any.
///
/// Written by the lifecycle manager on connect/detach; read by the
/// acquisition loop once per iteration. Readers get a cloned `Arc`, so a
/// detach that lands mid-scan only takes effect on the next snapshot.
#[derive(Clone, Default)]
pub struct DeviceSlot {
    inner: Arc<RwLock<Option<ActiveDevice>>>,
}

impl DeviceSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the active device.
    pub fn current(&self) -> Option<ActiveDevice> {
        match self.inner.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn is_occupied(&self) -> bool {
        self.current().is_some()
    }

    pub(crate) fn install(&self, device: ActiveDevice) {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(device);
    }

    /// Drop the slot's reference. Returns true if a device was present.
    pub(crate) fn clear(&self) -> bool {
        let mut guard = self.inner.write().unwrap_or_else(|p| p.into_inner());
        let had = guard.take().is_some();
        if had {
            debug!("Device slot cleared");
        }
        had
    }

    /// Run `f` against the active device, e.g. to apply settings changes.
    pub fn with_current<R>(&self, f: impl FnOnce(&mut dyn SpectrumDevice) -> R) -> Option<R> {
        let device = self.current()?;
        let mut guard = lock_device(&device);
        Some(f(&mut **guard))
    }
}

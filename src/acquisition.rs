use crate::device::{into_active, lock_device, ActiveDevice, DeviceSlot, SpectrumDevice};
use crate::monitor::Monitor;
use crate::noise_filter::remove_noise_floor;
use crate::types::*;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use log::{debug, info, trace};
use std::time::Duration;

/// What one acquisition iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A filtered sweep was published.
    Published,
    /// The device produced no usable sweep this round.
    Skipped,
    /// No device is active and there is no fallback.
    Idle,
}

/// Repeatedly pulls sweeps from the active device, filters the noise
/// floor, updates the shared monitor and fans frames out to consumers.
///
/// The active device is re-read from the slot on every iteration, so a
/// detach between iterations is seen as "no device" on the next one. A
/// device that is detached mid-scan is still held by this iteration's
/// snapshot and simply reports a failed scan.
pub struct Acquisition {
    slot: DeviceSlot,
    monitor: Monitor,
    /// Used while no hardware is active.
    fallback: Option<ActiveDevice>,
    frame_txs: Vec<Sender<SweepFrame>>,
    clock: SessionClock,
    poll_interval: Duration,
    published: u64,
    skipped: u64,
    dropped_frames: u64,
}

impl Acquisition {
    pub fn new(
        slot: DeviceSlot,
        monitor: Monitor,
        frame_txs: Vec<Sender<SweepFrame>>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            slot,
            monitor,
            fallback: None,
            frame_txs,
            clock: SessionClock::new(),
            poll_interval,
            published: 0,
            skipped: 0,
            dropped_frames: 0,
        }
    }

    /// Substitute `device` whenever the slot is empty.
    pub fn with_fallback(mut self, device: Box<dyn SpectrumDevice>) -> Self {
        self.fallback = Some(into_active(device));
        self
    }

    pub fn published(&self) -> u64 {
        self.published
    }

    /// Run until `shutdown` fires or disconnects. Blocks the calling thread.
    pub fn run(&mut self, shutdown: Receiver<()>) {
        info!(
            "Acquisition running (poll every {:?}, fallback: {})",
            self.poll_interval,
            if self.fallback.is_some() { "demo" } else { "none" }
        );

        loop {
            self.step();
            match shutdown.recv_timeout(self.poll_interval) {
                Err(RecvTimeoutError::Timeout) => continue,
                Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        info!(
            "Acquisition shutting down after {} sweeps ({} skipped, {} frames dropped)",
            self.published, self.skipped, self.dropped_frames
        );
    }

    /// One iteration.
    pub fn step(&mut self) -> StepOutcome {
        let Some(device) = self.slot.current().or_else(|| self.fallback.clone()) else {
            self.monitor.set_device_name(None);
            return StepOutcome::Idle;
        };

        let (name, start, end, sweep) = {
            let mut dev = lock_device(&device);
            let start = dev.start_frequency();
            let end = dev.end_frequency();
            let sweep = dev.get_amplitudes();
            (dev.device_name().to_string(), start, end, sweep)
        };
        self.monitor.set_device_name(Some(&name));

        let sweep = match sweep {
            Some(s) if !s.is_empty() => s,
            _ => {
                self.skipped += 1;
                trace!("{}: no sweep this round", name);
                return StepOutcome::Skipped;
            }
        };

        let points = remove_noise_floor(&sweep);
        self.monitor.publish_sweep(points.clone());

        let frame = SweepFrame {
            timestamp_us: self.clock.now_us(),
            device_name: name,
            start_frequency: start,
            end_frequency: end,
            points,
        };
        for tx in &self.frame_txs {
            match tx.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => self.dropped_frames += 1,
                Err(TrySendError::Disconnected(_)) => {}
            }
        }

        self.published += 1;
        if self.published % 200 == 0 {
            debug!(
                "Acquisition: {} sweeps published, {} frames dropped",
                self.published, self.dropped_frames
            );
            trace!("Latest: {}", frame);
        }
        StepOutcome::Published
    }
}

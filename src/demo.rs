use crate::device::SpectrumDevice;
use crate::frequency::{Frequency, FrequencyLimits, FrequencyWindow, MHZ};
use crate::types::{SignalData, Sweep};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use std::thread;
use std::time::Duration;

pub const DEMO_LIMITS: FrequencyLimits = FrequencyLimits {
    min_frequency: 35.0 * MHZ,
    max_frequency: 6200.0 * MHZ,
    max_frequency_range: 6200.0 * MHZ,
    min_frequency_range: 1.0,
};

/// Centers of the synthesized carriers.
pub const CARRIER_CENTERS: [Frequency; 9] = [
    100.0 * MHZ,
    150.0 * MHZ,
    200.0 * MHZ,
    250.0 * MHZ,
    450.0 * MHZ,
    600.0 * MHZ,
    750.0 * MHZ,
    1000.0 * MHZ,
    1200.0 * MHZ,
];

const POINTS_PER_SWEEP: usize = 300;
const NOISE_FLOOR_DB: f32 = -100.0;
const NOISE_SPREAD_DB: f32 = 5.0;
const CARRIER_PEAK_DB: f32 = 50.0;
/// e-folding distance of a carrier's skirt.
const CARRIER_WIDTH: Frequency = 6.0 * MHZ;

/// Synthetic analyzer producing a noisy floor with a few carriers, for use
/// without hardware.
pub struct DemoDevice {
    window: FrequencyWindow,
    rng: SmallRng,
    /// Simulated exchange time per scan.
    exchange_delay: Duration,
}

impl DemoDevice {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_entropy())
    }

    /// Deterministic output for tests.
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            window: FrequencyWindow::new(DEMO_LIMITS, 105.0 * MHZ, 100.0 * MHZ, 100_000.0),
            rng,
            exchange_delay: Duration::from_millis(30),
        }
    }

    pub fn with_exchange_delay(mut self, delay: Duration) -> Self {
        self.exchange_delay = delay;
        self
    }

    /// Evenly spaced points across `[start, end]`.
    pub fn generate(&mut self, start: Frequency, end: Frequency) -> Sweep {
        let span = (end - start).max(0.0);
        let step = span / (POINTS_PER_SWEEP - 1) as Frequency;
        let mut sweep = Vec::with_capacity(POINTS_PER_SWEEP);

        for i in 0..POINTS_PER_SWEEP {
            let frequency = start + i as Frequency * step;
            let mut amplitude = NOISE_FLOOR_DB + self.rng.gen::<f32>() * NOISE_SPREAD_DB;

            let diff = (frequency - closest_carrier(frequency)).abs();
            if diff < span.max(CARRIER_WIDTH) {
                let gain = self.rng.gen_range(0.3f32..=1.0);
                amplitude += gain * CARRIER_PEAK_DB * (-diff / CARRIER_WIDTH).exp() as f32;
            }

            sweep.push(SignalData::new(frequency, amplitude));
        }
        sweep
    }
}

impl Default for DemoDevice {
    fn default() -> Self {
        Self::new()
    }
}

fn closest_carrier(frequency: Frequency) -> Frequency {
    CARRIER_CENTERS
        .iter()
        .copied()
        .min_by(|a, b| (frequency - a).abs().total_cmp(&(frequency - b).abs()))
        .unwrap_or(frequency)
}

impl SpectrumDevice for DemoDevice {
    fn device_name(&self) -> &str {
        "Demo Device"
    }

    fn window(&self) -> &FrequencyWindow {
        &self.window
    }

    fn window_mut(&mut self) -> &mut FrequencyWindow {
        &mut self.window
    }

    fn get_amplitudes(&mut self) -> Option<Sweep> {
        if !self.exchange_delay.is_zero() {
            thread::sleep(self.exchange_delay);
        }
        let (start, end) = (self.window.start_frequency(), self.window.end_frequency());
        Some(self.generate(start, end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn demo() -> DemoDevice {
        DemoDevice::seeded(7).with_exchange_delay(Duration::ZERO)
    }

    #[test]
    fn test_sweep_covers_window_ascending() {
        let mut d = demo();
        let sweep = d.get_amplitudes().unwrap();
        assert_eq!(sweep.len(), POINTS_PER_SWEEP);
        assert_eq!(sweep[0].frequency, d.start_frequency());
        assert!((sweep.last().unwrap().frequency - d.end_frequency()).abs() < 1.0);
        assert!(sweep.windows(2).all(|w| w[0].frequency < w[1].frequency));
    }

    #[test]
    fn test_carrier_peaks_rise_above_floor() {
        let mut d = demo();
        // Window 55..155 MHz contains the 100 and 150 MHz carriers.
        let sweep = d.get_amplitudes().unwrap();
        let near_100 = sweep
            .iter()
            .min_by(|a, b| (a.frequency - 100.0 * MHZ).abs().total_cmp(&(b.frequency - 100.0 * MHZ).abs()))
            .unwrap();
        assert!(near_100.amplitude > NOISE_FLOOR_DB + NOISE_SPREAD_DB + 10.0);
        assert!(sweep.iter().all(|p| p.amplitude >= NOISE_FLOOR_DB));
        assert!(sweep.iter().all(|p| p.amplitude <= NOISE_FLOOR_DB + NOISE_SPREAD_DB + CARRIER_PEAK_DB));
    }

    #[test]
    fn test_floor_far_from_carriers() {
        let mut d = demo();
        d.set_frequency_range(10.0 * MHZ);
        d.set_center_frequency(3000.0 * MHZ);
        let sweep = d.get_amplitudes().unwrap();
        assert!(sweep
            .iter()
            .all(|p| p.amplitude <= NOISE_FLOOR_DB + NOISE_SPREAD_DB + 1e-3));
    }

    #[test]
    fn test_seeded_is_deterministic() {
        let a = demo().get_amplitudes().unwrap();
        let b = demo().get_amplitudes().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_closest_carrier() {
        assert_eq!(closest_carrier(120.0 * MHZ), 100.0 * MHZ);
        assert_eq!(closest_carrier(5000.0 * MHZ), 1200.0 * MHZ);
    }
}

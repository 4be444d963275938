//! Suppression of the firmware's constant noise-floor artifact.
//!
//! The device reports many bins at one identical amplitude unrelated to the
//! signal. Those bins are pulled down to the sweep minimum so the artifact
//! does not show up as a flat shelf.

use crate::types::{SignalData, Sweep};
use std::collections::HashMap;

/// Exact-equality key for an amplitude (folds -0.0 into 0.0).
fn key(amplitude: f32) -> u32 {
    (amplitude + 0.0).to_bits()
}

/// The amplitude occurring most often. Ties go to the value that appears
/// first in the sweep.
pub fn most_frequent_amplitude(sweep: &[SignalData]) -> Option<f32> {
    let mut counts: HashMap<u32, usize> = HashMap::with_capacity(sweep.len());
    for point in sweep {
        *counts.entry(key(point.amplitude)).or_insert(0) += 1;
    }

    let mut best: Option<(f32, usize)> = None;
    for point in sweep {
        let count = counts[&key(point.amplitude)];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((point.amplitude, count));
        }
    }
    best.map(|(amplitude, _)| amplitude)
}

/// Replace every point at the most frequent amplitude with the sweep's
/// minimum amplitude. Frequencies and length are unchanged.
pub fn remove_noise_floor(sweep: &[SignalData]) -> Sweep {
    let Some(mode) = most_frequent_amplitude(sweep) else {
        return Vec::new();
    };
    let min = sweep
        .iter()
        .map(|p| p.amplitude)
        .fold(f32::INFINITY, f32::min);

    let mode_key = key(mode);
    sweep
        .iter()
        .map(|p| {
            let mut out = *p;
            if key(p.amplitude) == mode_key {
                out.amplitude = min;
            }
            out
        })
        .collect()
}

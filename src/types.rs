use crate::frequency::{format_frequency, Frequency};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::time::Instant;

// ─── Samples ────────────────────────────────────────────────────────────────

/// One point of a sweep.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalData {
    /// Hz
    pub frequency: Frequency,
    /// dB
    pub amplitude: f32,
}

impl SignalData {
    pub fn new(frequency: Frequency, amplitude: f32) -> Self {
        Self {
            frequency,
            amplitude,
        }
    }
}

/// One completed scan, frequency-ascending.
pub type Sweep = Vec<SignalData>;

pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Fixed-capacity most-recent-first list of sweeps backing the waterfall.
#[derive(Debug, Clone)]
pub struct SweepHistory {
    capacity: usize,
    sweeps: VecDeque<Sweep>,
}

impl SweepHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            sweeps: VecDeque::with_capacity(capacity),
        }
    }

    /// Push the newest sweep to the front, evicting the oldest at capacity.
    pub fn push(&mut self, sweep: Sweep) {
        if self.sweeps.len() == self.capacity {
            self.sweeps.pop_back();
        }
        self.sweeps.push_front(sweep);
    }

    pub fn len(&self) -> usize {
        self.sweeps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sweeps.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recent sweep, if any.
    pub fn latest(&self) -> Option<&Sweep> {
        self.sweeps.front()
    }

    /// Iterate most-recent first.
    pub fn iter(&self) -> impl Iterator<Item = &Sweep> {
        self.sweeps.iter()
    }
}

impl Default for SweepHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

// ─── Connection status ──────────────────────────────────────────────────────

/// Hardware connection state, owned by the lifecycle manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConnectionStatus {
    #[default]
    Waiting,
    Connecting,
    Connected,
    Failed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConnectionStatus::Waiting => "waiting",
            ConnectionStatus::Connecting => "connecting",
            ConnectionStatus::Connected => "connected",
            ConnectionStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

// ─── Published sweep frame ──────────────────────────────────────────────────

/// A filtered sweep as fanned out to downstream consumers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepFrame {
    /// Microseconds since session start
    pub timestamp_us: u64,
    pub device_name: String,
    pub start_frequency: Frequency,
    pub end_frequency: Frequency,
    pub points: Sweep,
}

impl SweepFrame {
    /// Strongest point of the sweep.
    pub fn peak(&self) -> Option<SignalData> {
        self.points
            .iter()
            .copied()
            .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
    }
}

impl fmt::Display for SweepFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let peak = match self.peak() {
            Some(p) => format!("{:.1} dB @ {}", p.amplitude, format_frequency(p.frequency)),
            None => "---".to_string(),
        };
        write!(
            f,
            "t={:>10}µs  {}  [{} .. {}]  n={}  peak={}",
            self.timestamp_us,
            self.device_name,
            format_frequency(self.start_frequency),
            format_frequency(self.end_frequency),
            self.points.len(),
            peak,
        )
    }
}

// ─── Session clock ──────────────────────────────────────────────────────────

/// Monotonic clock for the capture session.
#[derive(Clone)]
pub struct SessionClock {
    start: Instant,
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

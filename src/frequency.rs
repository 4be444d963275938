//! Frequency arithmetic: unit constants, text formatting/parsing, and the
//! clamped sweep window every device carries.

use serde::{Deserialize, Serialize};

/// Frequency in Hz.
pub type Frequency = f64;

pub const HZ: Frequency = 1.0;
pub const KHZ: Frequency = 1_000.0;
pub const MHZ: Frequency = 1_000_000.0;
pub const GHZ: Frequency = 1_000_000_000.0;

/// Finest step a sweep can use. Steps travel as whole hertz.
pub const MIN_FREQUENCY_STEP: Frequency = 1.0;

/// Clamp `value` into `[lo, hi]`.
///
/// Unlike `f64::clamp` this never panics: when the bounds cross (a span
/// wider than the device range) the lower bound wins.
pub fn coerce_in(value: Frequency, lo: Frequency, hi: Frequency) -> Frequency {
    if value > hi {
        hi.max(lo)
    } else if value < lo {
        lo
    } else {
        value
    }
}

fn unit_for(value: Frequency) -> (Frequency, &'static str) {
    let magnitude = value.abs();
    if magnitude >= GHZ {
        (GHZ, "GHz")
    } else if magnitude >= MHZ {
        (MHZ, "MHz")
    } else if magnitude >= KHZ {
        (KHZ, "kHz")
    } else {
        (HZ, "Hz")
    }
}

/// "105.0 MHz", "2.4 GHz", "950 Hz".
pub fn format_frequency(value: Frequency) -> String {
    let (_, suffix) = unit_for(value);
    format!("{} {}", format_frequency_value(value), suffix)
}

/// Scaled number without the unit suffix, for axis labels.
pub fn format_frequency_value(value: Frequency) -> String {
    let (scale, _) = unit_for(value);
    if scale == HZ {
        format!("{:.0}", value)
    } else {
        format!("{:.1}", value / scale)
    }
}

/// Parse user-entered frequency text.
///
/// Accepts a decimal number with an optional `Hz`/`kHz`/`MHz`/`GHz` suffix
/// (case-insensitive, whitespace allowed). A bare number is Hz.
pub fn parse_frequency(text: &str) -> Result<Frequency, String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err("empty frequency".to_string());
    }

    let lower = trimmed.to_ascii_lowercase();
    let (number, scale) = if let Some(n) = lower.strip_suffix("ghz") {
        (n, GHZ)
    } else if let Some(n) = lower.strip_suffix("mhz") {
        (n, MHZ)
    } else if let Some(n) = lower.strip_suffix("khz") {
        (n, KHZ)
    } else if let Some(n) = lower.strip_suffix("hz") {
        (n, HZ)
    } else {
        (lower.as_str(), HZ)
    };

    let value: f64 = number
        .trim()
        .parse()
        .map_err(|_| format!("not a frequency: {:?}", text))?;
    if !value.is_finite() {
        return Err(format!("frequency must be finite: {:?}", text));
    }
    if value < 0.0 {
        return Err(format!("frequency must not be negative: {:?}", text));
    }
    Ok(value * scale)
}

// ─── Sweep window ───────────────────────────────────────────────────────────

/// Fixed limits of a device family.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrequencyLimits {
    pub min_frequency: Frequency,
    pub max_frequency: Frequency,
    /// Widest span one scan can cover.
    pub max_frequency_range: Frequency,
    /// Narrowest span accepted. Always positive.
    pub min_frequency_range: Frequency,
}

/// Center/span/step of a device, kept inside its [`FrequencyLimits`].
///
/// After every mutation the span lies in
/// `[min_frequency_range, max_frequency_range]` and the window
/// `[start, end]` lies inside `[min_frequency, max_frequency]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyWindow {
    limits: FrequencyLimits,
    center: Frequency,
    range: Frequency,
    step: Frequency,
}

impl FrequencyWindow {
    pub fn new(limits: FrequencyLimits, center: Frequency, range: Frequency, step: Frequency) -> Self {
        let mut window = Self {
            limits,
            center: limits.min_frequency,
            range: limits.min_frequency_range,
            step: MIN_FREQUENCY_STEP,
        };
        window.set_frequency_step(step);
        window.set_frequency_range(range);
        window.set_center_frequency(center);
        window
    }

    pub fn limits(&self) -> &FrequencyLimits {
        &self.limits
    }

    pub fn center_frequency(&self) -> Frequency {
        self.center
    }

    pub fn frequency_range(&self) -> Frequency {
        self.range
    }

    pub fn frequency_step(&self) -> Frequency {
        self.step
    }

    pub fn start_frequency(&self) -> Frequency {
        self.center - self.range / 2.0
    }

    pub fn end_frequency(&self) -> Frequency {
        self.center + self.range / 2.0
    }

    pub fn set_center_frequency(&mut self, center: Frequency) {
        if !center.is_finite() {
            return;
        }
        let half = self.range / 2.0;
        self.center = coerce_in(
            center,
            self.limits.min_frequency + half,
            self.limits.max_frequency - half,
        );
    }

    /// Clamp the span, then re-clamp the center against the new span.
    ///
    /// The span never exceeds the device band itself, even when
    /// `max_frequency_range` is nominally wider.
    pub fn set_frequency_range(&mut self, range: Frequency) {
        if !range.is_finite() {
            return;
        }
        let widest = self
            .limits
            .max_frequency_range
            .min(self.limits.max_frequency - self.limits.min_frequency);
        self.range = coerce_in(range, self.limits.min_frequency_range, widest);
        let center = self.center;
        self.set_center_frequency(center);
    }

    /// Non-positive and non-finite steps are ignored; positive steps below
    /// [`MIN_FREQUENCY_STEP`] are raised to it.
    pub fn set_frequency_step(&mut self, step: Frequency) {
        if step.is_finite() && step > 0.0 {
            self.step = step.max(MIN_FREQUENCY_STEP);
        }
    }

    /// Move the window so it starts at `start`, keeping the span.
    pub fn set_start_frequency(&mut self, start: Frequency) {
        self.set_center_frequency(start + self.range / 2.0);
    }

    /// Move the window so it ends at `end`, keeping the span.
    pub fn set_end_frequency(&mut self, end: Frequency) {
        self.set_center_frequency(end - self.range / 2.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn arinst_limits() -> FrequencyLimits {
        FrequencyLimits {
            min_frequency: 35.0 * MHZ,
            max_frequency: 6200.0 * MHZ,
            max_frequency_range: 6200.0 * MHZ,
            min_frequency_range: 1.0 * MHZ,
        }
    }

    fn window() -> FrequencyWindow {
        FrequencyWindow::new(arinst_limits(), 105.0 * MHZ, 100.0 * MHZ, 100.0 * KHZ)
    }

    #[test]
    fn test_format_picks_largest_unit() {
        assert_eq!(format_frequency(105.0 * MHZ), "105.0 MHz");
        assert_eq!(format_frequency(2.4 * GHZ), "2.4 GHz");
        assert_eq!(format_frequency(12.5 * KHZ), "12.5 kHz");
        assert_eq!(format_frequency(950.0), "950 Hz");
        assert_eq!(format_frequency_value(433.92 * MHZ), "433.9");
    }

    #[test]
    fn test_parse_frequency_units() {
        assert_eq!(parse_frequency("105.5MHz").unwrap(), 105.5 * MHZ);
        assert_eq!(parse_frequency(" 2.4 ghz ").unwrap(), 2.4 * GHZ);
        assert_eq!(parse_frequency("100 kHz").unwrap(), 100.0 * KHZ);
        assert_eq!(parse_frequency("433920000").unwrap(), 433_920_000.0);
        assert_eq!(parse_frequency("50Hz").unwrap(), 50.0);
    }

    #[test]
    fn test_parse_frequency_rejects_nonsense() {
        assert!(parse_frequency("").is_err());
        assert!(parse_frequency("abc").is_err());
        assert!(parse_frequency("MHz").is_err());
        assert!(parse_frequency("-5 MHz").is_err());
        assert!(parse_frequency("inf").is_err());
        assert!(parse_frequency("NaN").is_err());
    }

    #[test]
    fn test_coerce_in_crossed_bounds_prefers_lower() {
        assert_eq!(coerce_in(5.0, 10.0, 2.0), 10.0);
        assert_eq!(coerce_in(5.0, 0.0, 10.0), 5.0);
        assert_eq!(coerce_in(-1.0, 0.0, 10.0), 0.0);
        assert_eq!(coerce_in(11.0, 0.0, 10.0), 10.0);
    }

    #[test]
    fn test_defaults_derive_start_end() {
        let w = window();
        assert_eq!(w.start_frequency(), 55.0 * MHZ);
        assert_eq!(w.end_frequency(), 155.0 * MHZ);
    }

    #[test]
    fn test_center_clamped_to_keep_window_inside() {
        let mut w = window();
        w.set_center_frequency(0.0);
        assert_eq!(w.start_frequency(), 35.0 * MHZ);
        w.set_center_frequency(10.0 * GHZ);
        assert_eq!(w.end_frequency(), 6200.0 * MHZ);
    }

    #[test]
    fn test_range_clamped_then_center_reclamped() {
        let mut w = window();
        w.set_frequency_range(0.0);
        assert_eq!(w.frequency_range(), 1.0 * MHZ);

        // Widening at 105 MHz pushes the start below 35 MHz; center moves up.
        w.set_frequency_range(1000.0 * MHZ);
        assert_eq!(w.frequency_range(), 1000.0 * MHZ);
        assert_eq!(w.start_frequency(), 35.0 * MHZ);
        assert_eq!(w.center_frequency(), 535.0 * MHZ);

        w.set_frequency_range(1.0e12);
        assert_eq!(w.frequency_range(), 6165.0 * MHZ);
        assert_eq!(w.start_frequency(), 35.0 * MHZ);
        assert_eq!(w.end_frequency(), 6200.0 * MHZ);
    }

    #[test]
    fn test_start_round_trip_within_bounds() {
        let mut w = window();
        w.set_start_frequency(400.0 * MHZ);
        assert_eq!(w.start_frequency(), 400.0 * MHZ);
        assert_eq!(w.frequency_range(), 100.0 * MHZ);
        w.set_end_frequency(1000.0 * MHZ);
        assert_eq!(w.end_frequency(), 1000.0 * MHZ);
    }

    #[test]
    fn test_start_clamped_out_of_bounds() {
        let mut w = window();
        w.set_start_frequency(1.0 * MHZ);
        assert_eq!(w.start_frequency(), 35.0 * MHZ);
        w.set_end_frequency(7000.0 * MHZ);
        assert_eq!(w.end_frequency(), 6200.0 * MHZ);
    }

    #[test]
    fn test_non_finite_input_ignored() {
        let mut w = window();
        w.set_center_frequency(f64::NAN);
        w.set_frequency_range(f64::INFINITY);
        w.set_frequency_step(-1.0);
        w.set_frequency_step(0.0);
        assert_eq!(w, window());
    }

    #[test]
    fn test_sub_hertz_step_raised_to_minimum() {
        let mut w = window();
        w.set_frequency_step(0.5);
        assert_eq!(w.frequency_step(), MIN_FREQUENCY_STEP);
        w.set_frequency_step(1e-9);
        assert_eq!(w.frequency_step(), MIN_FREQUENCY_STEP);
        w.set_frequency_step(2.5);
        assert_eq!(w.frequency_step(), 2.5);

        let tiny = FrequencyWindow::new(arinst_limits(), 105.0 * MHZ, 100.0 * MHZ, 0.25);
        assert_eq!(tiny.frequency_step(), MIN_FREQUENCY_STEP);
    }

    #[derive(Debug, Clone)]
    enum Mutation {
        Center(f64),
        Range(f64),
        Start(f64),
        End(f64),
        Step(f64),
    }

    fn mutation() -> impl Strategy<Value = Mutation> {
        prop_oneof![
            (-1.0e10..1.0e10f64).prop_map(Mutation::Center),
            (-1.0e10..1.0e10f64).prop_map(Mutation::Range),
            (-1.0e10..1.0e10f64).prop_map(Mutation::Start),
            (-1.0e10..1.0e10f64).prop_map(Mutation::End),
            (-10.0..1.0e6f64).prop_map(Mutation::Step),
        ]
    }

    proptest! {
        #[test]
        fn test_window_invariants_hold_after_any_mutations(
            ops in proptest::collection::vec(mutation(), 0..40)
        ) {
            let limits = arinst_limits();
            let mut w = window();
            for op in ops {
                match op {
                    Mutation::Center(v) => w.set_center_frequency(v),
                    Mutation::Range(v) => w.set_frequency_range(v),
                    Mutation::Start(v) => w.set_start_frequency(v),
                    Mutation::End(v) => w.set_end_frequency(v),
                    Mutation::Step(v) => w.set_frequency_step(v),
                }
                let eps = 1e-3;
                prop_assert!(w.start_frequency() >= limits.min_frequency - eps);
                prop_assert!(w.end_frequency() <= limits.max_frequency + eps);
                prop_assert!(w.frequency_range() >= limits.min_frequency_range);
                prop_assert!(w.frequency_range() <= limits.max_frequency_range);
                prop_assert!(w.frequency_step() >= MIN_FREQUENCY_STEP);
            }
        }
    }
}

use crate::frequency::format_frequency;
use crate::monitor::Monitor;
use crate::types::*;
use crossbeam_channel::Receiver;
use std::io::{self, Write};
use std::time::{Duration, Instant};

/// Number of columns in the spectrum strip.
const STRIP_COLUMNS: usize = 54;
const STRIP_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
/// Amplitude range the strip maps onto its levels, dB.
const STRIP_FLOOR_DB: f32 = -110.0;
const STRIP_CEILING_DB: f32 = -20.0;

/// Renders a live ASCII dashboard of the analyzer state.
pub struct ConsoleDisplay {
    rx: Receiver<SweepFrame>,
    monitor: Monitor,
    update_hz: u32,
}

impl ConsoleDisplay {
    pub fn new(rx: Receiver<SweepFrame>, monitor: Monitor, update_hz: u32) -> Self {
        Self { rx, monitor, update_hz }
    }

    pub fn run(&self) {
        let min_gap = if self.update_hz == 0 {
            Duration::from_millis(500)
        } else {
            Duration::from_millis((1000 / self.update_hz as u64).max(1))
        };
        let mut last_draw: Option<Instant> = None;
        let mut stdout = io::stdout();

        for frame in self.rx.iter() {
            if last_draw.is_some_and(|t| t.elapsed() < min_gap) {
                continue;
            }
            last_draw = Some(Instant::now());

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");
            print!("{}", render(&frame, &self.monitor));
            let _ = stdout.flush();
        }
    }
}

/// One full dashboard as text.
pub fn render(frame: &SweepFrame, monitor: &Monitor) -> String {
    let state = monitor.snapshot();
    let mut out = String::new();

    out.push_str("╔══════════════════════════════════════════════════════════╗\n");
    out.push_str("║  SPECTRUM SWEEP  Live Monitor                            ║\n");
    out.push_str("╠══════════════════════════════════════════════════════════╣\n");
    out.push_str(&row(&format!(
        "Time: {:.2}s   Status: {}",
        frame.timestamp_us as f64 / 1_000_000.0,
        state.status
    )));
    out.push_str(&row(&format!("Device: {}", frame.device_name)));
    out.push_str(&row(&format!(
        "Window: {} .. {}",
        format_frequency(frame.start_frequency),
        format_frequency(frame.end_frequency)
    )));
    match frame.peak() {
        Some(p) => out.push_str(&row(&format!(
            "Peak: {:.1} dB @ {}",
            p.amplitude,
            format_frequency(p.frequency)
        ))),
        None => out.push_str(&row("Peak: ---")),
    }
    out.push_str(&row(&format!(
        "Points: {}   Sweeps: {}   History: {}/{}",
        frame.points.len(),
        state.sweeps_published,
        state.history.len(),
        state.history.capacity()
    )));
    out.push_str(&row(""));
    out.push_str(&row(&spectrum_strip(&frame.points, STRIP_COLUMNS)));
    out.push_str("╚══════════════════════════════════════════════════════════╝\n");
    out
}

fn row(text: &str) -> String {
    let body: String = text.chars().take(STRIP_COLUMNS).collect();
    let pad = STRIP_COLUMNS.saturating_sub(body.chars().count());
    format!("║  {}{}  ║\n", body, " ".repeat(pad))
}

/// Column-wise maximum of the sweep, one block character per column.
pub fn spectrum_strip(points: &[SignalData], columns: usize) -> String {
    if points.is_empty() || columns == 0 {
        return " ".repeat(columns);
    }
    let per_column = points.len().div_ceil(columns);
    let mut strip: String = points
        .chunks(per_column)
        .map(|chunk| {
            let peak = chunk
                .iter()
                .map(|p| p.amplitude)
                .fold(f32::NEG_INFINITY, f32::max);
            level_char(peak)
        })
        .collect();
    // Pad to fixed width (char count, not byte count)
    while strip.chars().count() < columns {
        strip.push(' ');
    }
    strip
}

fn level_char(amplitude: f32) -> char {
    let t = ((amplitude - STRIP_FLOOR_DB) / (STRIP_CEILING_DB - STRIP_FLOOR_DB)).clamp(0.0, 1.0);
    let idx = (t * (STRIP_LEVELS.len() - 1) as f32).round() as usize;
    STRIP_LEVELS[idx]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frequency::MHZ;

    #[test]
    fn test_strip_width_and_levels() {
        let points: Vec<SignalData> = (0..300)
            .map(|i| SignalData::new(i as f64, if i == 150 { -20.0 } else { -110.0 }))
            .collect();
        let strip = spectrum_strip(&points, 54);
        assert_eq!(strip.chars().count(), 54);
        assert_eq!(strip.chars().filter(|&c| c == '█').count(), 1);
        assert!(strip.chars().filter(|&c| c != ' ').all(|c| c == '▁' || c == '█'));
    }

    #[test]
    fn test_strip_empty() {
        assert_eq!(spectrum_strip(&[], 10), " ".repeat(10));
    }

    #[test]
    fn test_render_contains_peak_and_status() {
        let monitor = Monitor::new(10);
        let frame = SweepFrame {
            timestamp_us: 1_500_000,
            device_name: "Demo Device".to_string(),
            start_frequency: 55.0 * MHZ,
            end_frequency: 155.0 * MHZ,
            points: vec![
                SignalData::new(99.0 * MHZ, -90.0),
                SignalData::new(100.0 * MHZ, -45.5),
            ],
        };
        let text = render(&frame, &monitor);
        assert!(text.contains("Status: waiting"));
        assert!(text.contains("Peak: -45.5 dB @ 100.0 MHz"));
        assert!(text.contains("55.0 MHz .. 155.0 MHz"));
        assert!(text.lines().all(|l| l.chars().count() == 60));
    }
}

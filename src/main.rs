use spectrum_sweep::acquisition::Acquisition;
use spectrum_sweep::config::AnalyzerConfig;
use spectrum_sweep::console_display::ConsoleDisplay;
use spectrum_sweep::demo::DemoDevice;
use spectrum_sweep::device::DeviceSlot;
use spectrum_sweep::frequency::{format_frequency, parse_frequency, Frequency};
use spectrum_sweep::monitor::Monitor;
use spectrum_sweep::sweep_writer::SweepWriter;
use spectrum_sweep::types::*;
#[cfg(feature = "hardware")]
use spectrum_sweep::{lifecycle::LifecycleManager, rusb_host::RusbHost};

use clap::Parser;
use crossbeam_channel::{bounded, Sender};
use log::{error, info};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "spectrum-sweep")]
#[command(about = "Sweep capture for handheld USB spectrum analyzers")]
struct Cli {
    /// JSON config file; command-line values override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective config to this path and continue
    #[arg(long)]
    save_config: Option<PathBuf>,

    /// Substitute a synthetic device while no hardware is connected
    #[arg(long)]
    demo: bool,

    /// Center frequency, e.g. "105.5MHz" or "433920000"
    #[arg(long, value_parser = parse_frequency)]
    center: Option<Frequency>,

    /// Span, e.g. "20 MHz"
    #[arg(long, value_parser = parse_frequency)]
    span: Option<Frequency>,

    /// Step between points, e.g. "100kHz"
    #[arg(long, value_parser = parse_frequency)]
    step: Option<Frequency>,

    /// Input attenuation in dB (-30..=0)
    #[arg(long, allow_negative_numbers = true)]
    attenuation: Option<i32>,

    /// Use the tracking generator scan
    #[arg(long)]
    tracking: bool,

    /// USB vendor id, decimal or 0x-prefixed hex
    #[arg(long, value_parser = parse_usb_id)]
    vendor_id: Option<u16>,

    /// Restrict discovery to this USB product id. Without it every device of
    /// the vendor is a candidate, tried in enumeration order.
    #[arg(long, value_parser = parse_usb_id)]
    product_id: Option<u16>,

    /// Enable console display (terminal TUI)
    #[arg(long)]
    console: bool,

    /// Stream every sweep as a JSON line on stdout
    #[arg(long)]
    json: bool,

    /// Write every sweep as a JSON line to this file (truncated at startup)
    #[arg(long)]
    json_file: Option<PathBuf>,

    /// Console display refresh rate (Hz)
    #[arg(long, default_value_t = 10)]
    display_hz: u32,
}

fn parse_usb_id(text: &str) -> Result<u16, String> {
    let t = text.trim();
    let parsed = match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u16::from_str_radix(hex, 16),
        None => t.parse::<u16>(),
    };
    parsed.map_err(|e| format!("invalid USB id '{}': {}", text, e))
}

impl Cli {
    /// Layer the command line over the config file.
    fn apply(&self, config: &mut AnalyzerConfig) {
        if self.demo {
            config.demo = true;
        }
        if let Some(v) = self.center {
            config.sweep.center_frequency = v;
        }
        if let Some(v) = self.span {
            config.sweep.frequency_range = v;
        }
        if let Some(v) = self.step {
            config.sweep.frequency_step = v;
        }
        if let Some(v) = self.attenuation {
            config.sweep.attenuation_db = v;
        }
        if self.tracking {
            config.sweep.tracking = true;
        }
        if let Some(v) = self.vendor_id {
            config.vendor_id = v;
        }
        if self.product_id.is_some() {
            config.product_id = self.product_id;
        }
    }
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let mut config = cli
        .config
        .as_deref()
        .and_then(AnalyzerConfig::load)
        .unwrap_or_default();
    cli.apply(&mut config);

    if let Some(path) = &cli.save_config {
        if let Err(e) = config.save(path) {
            error!("Failed to save config to {:?}: {}", path, e);
        }
    }

    if !cfg!(feature = "hardware") && !config.demo {
        error!("Hardware support requires the 'hardware' feature. Falling back to demo device.");
        config.demo = true;
    }

    info!("═══════════════════════════════════════════════");
    info!("  SPECTRUM SWEEP v{}", env!("CARGO_PKG_VERSION"));
    info!("  USB filter: vendor {:04x}{}", config.vendor_id,
        config.product_id.map(|p| format!(" product {:04x}", p)).unwrap_or_default());
    info!("  Window: {} ± {} (step {})",
        format_frequency(config.sweep.center_frequency),
        format_frequency(config.sweep.frequency_range / 2.0),
        format_frequency(config.sweep.frequency_step));
    info!("  Attenuation: {} dB, tracking: {}", config.sweep.attenuation_db, config.sweep.tracking);
    if config.demo { info!("  Demo fallback: ON"); }
    if cli.console { info!("  UI: Console TUI"); }
    if cli.json { info!("  Output: JSON lines on stdout"); }
    if let Some(path) = &cli.json_file { info!("  Output: JSON lines to {:?}", path); }
    info!("═══════════════════════════════════════════════");

    let slot = DeviceSlot::new();
    let monitor = Monitor::new(config.history_capacity);

    // Channels: acquisition → consumers
    let mut frame_txs: Vec<Sender<SweepFrame>> = Vec::new();
    let mut handles = Vec::new();
    let mut writer_handle = None;

    // ─── Console display (opt-in, for headless/debug) ───────────────
    if cli.console {
        let (tx, rx) = bounded::<SweepFrame>(16);
        frame_txs.push(tx);
        let hz = cli.display_hz;
        let mon = monitor.clone();
        handles.push(thread::Builder::new().name("display".into()).spawn(move || {
            ConsoleDisplay::new(rx, mon, hz).run();
        }).unwrap());
    }

    // ─── JSON sweep stream ──────────────────────────────────────────
    if cli.json {
        let (tx, rx) = bounded::<SweepFrame>(256);
        frame_txs.push(tx);
        writer_handle = Some(thread::Builder::new().name("sweep-writer".into()).spawn(move || {
            SweepWriter::stdout(rx).run();
        }).unwrap());
    }

    if let Some(path) = &cli.json_file {
        let (tx, rx) = bounded::<SweepFrame>(256);
        match SweepWriter::create(rx, path) {
            Ok(mut writer) => {
                frame_txs.push(tx);
                handles.push(thread::Builder::new().name("sweep-file".into()).spawn(move || {
                    writer.run();
                }).unwrap());
            }
            Err(e) => error!("Failed to create {:?}: {}", path, e),
        }
    }

    // ─── Device lifecycle ───────────────────────────────────────────
    let (lifecycle_stop_tx, lifecycle_stop_rx) = bounded::<()>(1);
    #[cfg(feature = "hardware")]
    {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        match RusbHost::new(config.device_filter(), event_tx) {
            Ok(host) => {
                let mut manager = LifecycleManager::new(
                    Box::new(host), event_rx, slot.clone(), monitor.clone(), &config,
                );
                handles.push(thread::Builder::new().name("lifecycle".into()).spawn(move || {
                    manager.run(lifecycle_stop_rx);
                }).unwrap());
            }
            Err(e) => {
                error!("USB host unavailable ({}). Falling back to demo device.", e);
                config.demo = true;
            }
        }
    }
    #[cfg(not(feature = "hardware"))]
    drop(lifecycle_stop_rx);

    // ─── Acquisition ────────────────────────────────────────────────
    let (acq_stop_tx, acq_stop_rx) = bounded::<()>(1);
    let mut acquisition = Acquisition::new(slot, monitor, frame_txs, config.poll_interval());
    if config.demo {
        let mut demo = DemoDevice::new()
            .with_exchange_delay(Duration::from_millis(config.demo_exchange_delay_ms));
        config.sweep.apply_window(&mut demo);
        acquisition = acquisition.with_fallback(Box::new(demo));
    }
    let acq_handle = thread::Builder::new().name("acquisition".into()).spawn(move || {
        acquisition.run(acq_stop_rx);
    }).unwrap();

    // The JSON stream ends when stdout closes; take the pipeline down with it.
    if let Some(writer) = writer_handle {
        let _ = writer.join();
        info!("Output closed, shutting down");
        let _ = acq_stop_tx.send(());
        let _ = lifecycle_stop_tx.send(());
    } else {
        info!("Running headless. Press Ctrl+C to stop.");
    }

    let _ = acq_handle.join();
    for h in handles {
        let _ = h.join();
    }
}

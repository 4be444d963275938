pub mod acquisition;
pub mod arinst;
pub mod config;
pub mod console_display;
pub mod demo;
pub mod device;
pub mod frequency;
pub mod lifecycle;
pub mod monitor;
pub mod noise_filter;
pub mod protocol;
pub mod sweep_writer;
pub mod types;
pub mod usb;

#[cfg(feature = "hardware")]
pub mod rusb_host;

use crate::types::*;
use crossbeam_channel::Receiver;
use log::{error, info};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Streams sweep frames as JSON lines.
pub struct SweepWriter<W: Write> {
    rx: Receiver<SweepFrame>,
    out: W,
}

impl SweepWriter<BufWriter<io::Stdout>> {
    pub fn stdout(rx: Receiver<SweepFrame>) -> Self {
        Self::new(rx, BufWriter::new(io::stdout()))
    }
}

impl SweepWriter<BufWriter<File>> {
    pub fn create(rx: Receiver<SweepFrame>, path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        info!("Sweep writer → {:?}", path);
        Ok(Self::new(rx, BufWriter::new(file)))
    }
}

impl<W: Write> SweepWriter<W> {
    pub fn new(rx: Receiver<SweepFrame>, out: W) -> Self {
        Self { rx, out }
    }

    /// Run until the frame channel closes. Blocks the calling thread.
    /// Returns the number of frames written.
    pub fn run(&mut self) -> u64 {
        let mut frame_count: u64 = 0;

        for frame in self.rx.iter() {
            if let Err(e) = write_frame(&mut self.out, &frame) {
                error!("Sweep writer stopped: {}", e);
                break;
            }
            frame_count += 1;
            if frame_count % 1000 == 0 {
                info!("Wrote {} sweeps", frame_count);
            }
        }

        let _ = self.out.flush();
        info!("Sweep writer finished after {} frames", frame_count);
        frame_count
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

/// One frame per line, flushed so a downstream pipe sees it immediately.
pub fn write_frame<W: Write>(out: &mut W, frame: &SweepFrame) -> io::Result<()> {
    serde_json::to_writer(&mut *out, frame).map_err(io::Error::other)?;
    out.write_all(b"\n")?;
    out.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    fn frame(t: u64) -> SweepFrame {
        SweepFrame {
            timestamp_us: t,
            device_name: "Demo Device".to_string(),
            start_frequency: 55e6,
            end_frequency: 155e6,
            points: vec![SignalData::new(55e6, -97.5), SignalData::new(155e6, -42.0)],
        }
    }

    #[test]
    fn test_writes_one_json_line_per_frame() {
        let (tx, rx) = unbounded();
        tx.send(frame(10)).unwrap();
        tx.send(frame(20)).unwrap();
        drop(tx);

        let mut writer = SweepWriter::new(rx, Vec::new());
        assert_eq!(writer.run(), 2);
        let text = String::from_utf8(writer.into_inner()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: SweepFrame = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed.timestamp_us, 20);
        assert_eq!(parsed.points.len(), 2);
        assert_eq!(parsed.points[1].amplitude, -42.0);
    }

    #[test]
    fn test_file_sink() {
        let path = std::env::temp_dir().join(format!("sweeps-{}.jsonl", std::process::id()));
        let (tx, rx) = unbounded();
        tx.send(frame(1)).unwrap();
        drop(tx);
        let mut writer = SweepWriter::create(rx, &path).unwrap();
        writer.run();
        drop(writer);
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("\"device_name\":\"Demo Device\""));
        let _ = std::fs::remove_file(&path);
    }
}

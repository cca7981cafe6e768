//! LED sinks: where rendered frames go
//!
//! The physical strip driver is not part of this crate. A sink receives one
//! [`Frame`] per tick; [`DeviceSink`] hands brightness-scaled, channel-ordered
//! bytes to a device node or FIFO that a driver process reads.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{debug, info};

use crate::MetarMapError;
use crate::config::{LedConfig, OutputKind};
use crate::models::{ColorOrder, Frame};

/// Accepts one frame per tick
pub trait LedSink: Send {
    fn show(&mut self, frame: &Frame) -> crate::Result<()>;
}

impl<S: LedSink + ?Sized> LedSink for Box<S> {
    fn show(&mut self, frame: &Frame) -> crate::Result<()> {
        (**self).show(frame)
    }
}

/// Build the sink selected by `led.output`
pub fn from_config(led: &LedConfig) -> crate::Result<Box<dyn LedSink>> {
    let sink: Box<dyn LedSink> = match led.output {
        OutputKind::Log => Box::new(LogSink::default()),
        OutputKind::Terminal => Box::new(TerminalSink::new(std::io::stdout())),
        OutputKind::Device => {
            let path = led
                .device_path
                .as_deref()
                .ok_or_else(|| MetarMapError::config("output = \"device\" requires led.device_path"))?;
            Box::new(DeviceSink::open(path, led.color_order)?)
        }
    };
    info!("LED output: {:?}", led.output);
    Ok(sink)
}

/// Logs a frame summary whenever the frame changes
#[derive(Debug, Default)]
pub struct LogSink {
    last: Option<Frame>,
}

impl LedSink for LogSink {
    fn show(&mut self, frame: &Frame) -> crate::Result<()> {
        if self.last.as_ref() == Some(frame) {
            return Ok(());
        }
        let pixels = frame
            .pixels
            .iter()
            .map(|p| format!("#{:02x}{:02x}{:02x}", p.0, p.1, p.2))
            .collect::<Vec<_>>()
            .join(" ");
        debug!("frame @{:.2}: {}", frame.brightness, pixels);
        self.last = Some(frame.clone());
        Ok(())
    }
}

/// True-color preview: one block per LED, redrawn in place
pub struct TerminalSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> TerminalSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> LedSink for TerminalSink<W> {
    fn show(&mut self, frame: &Frame) -> crate::Result<()> {
        let mut line = String::with_capacity(frame.pixels.len() * 24 + 8);
        line.push('\r');
        for pixel in &frame.pixels {
            let p = pixel.scale(frame.brightness);
            line.push_str(&format!("\x1b[48;2;{};{};{}m  ", p.0, p.1, p.2));
        }
        line.push_str("\x1b[0m");

        self.out
            .write_all(line.as_bytes())
            .and_then(|()| self.out.flush())
            .map_err(|e| MetarMapError::render(format!("terminal write failed: {e}")))
    }
}

/// Writes `3 * LED_COUNT` wire bytes per frame to a device node or FIFO
pub struct DeviceSink {
    path: PathBuf,
    order: ColorOrder,
    device: std::fs::File,
}

impl DeviceSink {
    pub fn open(path: &Path, order: ColorOrder) -> crate::Result<Self> {
        let device = OpenOptions::new().write(true).open(path)?;
        info!("Writing frames to {}", path.display());
        Ok(Self {
            path: path.to_path_buf(),
            order,
            device,
        })
    }
}

impl LedSink for DeviceSink {
    fn show(&mut self, frame: &Frame) -> crate::Result<()> {
        self.device
            .write_all(&frame.wire_bytes(self.order))
            .and_then(|()| self.device.flush())
            .map_err(|e| MetarMapError::render(format!("{}: {e}", self.path.display())))
    }
}

/// Keeps every frame in memory; clones share the same recording
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<Frame>>>,
    failures_pending: Arc<Mutex<u32>>,
}

impl RecordingSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames shown so far
    #[must_use]
    pub fn frames(&self) -> Vec<Frame> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Make the next `count` calls to `show` fail
    pub fn fail_next(&self, count: u32) {
        *self
            .failures_pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = count;
    }
}

impl LedSink for RecordingSink {
    fn show(&mut self, frame: &Frame) -> crate::Result<()> {
        {
            let mut pending = self
                .failures_pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if *pending > 0 {
                *pending -= 1;
                return Err(MetarMapError::render("strip unavailable"));
            }
        }
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(frame.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Rgb;

    #[test]
    fn test_terminal_sink_output() {
        let mut sink = TerminalSink::new(Vec::new());
        sink.show(&Frame::new(vec![Rgb(255, 0, 0), Rgb(0, 0, 0)], 1.0))
            .unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.starts_with('\r'));
        assert!(out.contains("\x1b[48;2;255;0;0m"));
        assert!(out.ends_with("\x1b[0m"));
    }

    #[test]
    fn test_device_sink_writes_wire_bytes() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut sink = DeviceSink::open(file.path(), ColorOrder::Grb).unwrap();
        sink.show(&Frame::new(vec![Rgb(10, 20, 30)], 1.0)).unwrap();
        sink.show(&Frame::new(vec![Rgb(255, 255, 255)], 0.0)).unwrap();
        let bytes = std::fs::read(file.path()).unwrap();
        assert_eq!(bytes, vec![20, 10, 30, 0, 0, 0]);
    }

    #[test]
    fn test_device_sink_missing_path() {
        let result = DeviceSink::open(Path::new("/nonexistent/metarmap/strip"), ColorOrder::Rgb);
        let err = result.err().unwrap();
        assert!(matches!(err, MetarMapError::Io { .. }));
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_recording_sink_failures() {
        let mut sink = RecordingSink::new();
        let handle = sink.clone();
        handle.fail_next(1);
        let frame = Frame::filled(2, Rgb(1, 2, 3), 0.5);
        assert!(sink.show(&frame).is_err());
        assert!(sink.show(&frame).is_ok());
        assert_eq!(handle.frames(), vec![frame]);
    }

    #[test]
    fn test_log_sink_accepts_frames() {
        let mut sink = LogSink::default();
        let frame = Frame::filled(2, Rgb(5, 5, 5), 0.6);
        assert!(sink.show(&frame).is_ok());
        assert!(sink.show(&frame).is_ok());
    }

    #[test]
    fn test_from_config_default_is_log() {
        assert!(from_config(&LedConfig::default()).is_ok());
    }
}

//! Console output for plan listings and dashboards
//!
//! The rollover loop writes its human-facing report through a [`Console`]
//! rather than straight to stdout, so the same output can be captured.

use parking_lot::Mutex;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;

/// Line-oriented output sink
#[derive(Clone)]
pub struct Console {
    sink: Arc<Mutex<Box<dyn Write + Send>>>,
    failed: Arc<AtomicBool>,
}

impl Console {
    /// Console writing to stdout
    pub fn stdout() -> Self {
        Self::from_writer(std::io::stdout())
    }

    pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            sink: Arc::new(Mutex::new(Box::new(writer))),
            failed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Console that keeps everything in memory; the buffer is readable
    /// through the returned handle
    pub fn buffer() -> (Self, ConsoleBuffer) {
        let buffer = ConsoleBuffer::default();
        (Self::from_writer(buffer.clone()), buffer)
    }

    /// Write one line. The first write error is logged; later ones only
    /// keep [`Console::has_failed`] set
    pub fn line(&self, text: impl AsRef<str>) {
        let mut sink = self.sink.lock();
        let written = writeln!(sink, "{}", text.as_ref()).and_then(|_| sink.flush());

        if let Err(e) = written {
            if !self.failed.swap(true, Ordering::Relaxed) {
                warn!(error = %e, "Console output failed; report lines are being lost");
            }
        }
    }

    /// Whether any line failed to reach the sink
    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Shared in-memory buffer behind [`Console::buffer`]
#[derive(Clone, Default)]
pub struct ConsoleBuffer {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl ConsoleBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.bytes.lock()).into_owned()
    }
}

impl Write for ConsoleBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.bytes.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

//! Bounded in-memory log, served to remote clients through `Software.GetLog`

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Local;
use log::{LevelFilter, Log, Metadata, Record};

/// Ring buffer of formatted log lines. Clones share the same buffer.
#[derive(Debug, Clone)]
pub struct LogBuffer {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl LogBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<String>> {
        // A panic while holding the lock leaves the buffer usable
        self.lines.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Appends a line, evicting the oldest one when full
    pub fn push(&self, line: impl Into<String>) {
        let mut lines = self.guard();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// All buffered lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.guard().iter().cloned().collect()
    }

    /// The last `count` lines, oldest first
    pub fn tail(&self, count: usize) -> Vec<String> {
        let lines = self.guard();
        lines
            .iter()
            .skip(lines.len().saturating_sub(count))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.guard().len()
    }

    pub fn is_empty(&self) -> bool {
        self.guard().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.guard().clear();
    }
}

/// `log` backend that only records into a [`LogBuffer`]. Combine it with a
/// console logger to get both.
pub struct BufferedLogger {
    buffer: LogBuffer,
    level: LevelFilter,
}

impl BufferedLogger {
    pub fn new(buffer: LogBuffer, level: LevelFilter) -> Self {
        Self { buffer, level }
    }

    fn format(record: &Record) -> String {
        format!(
            "{} {:<5} {}: {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            record.level(),
            record.target(),
            record.args()
        )
    }
}

impl Log for BufferedLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.buffer.push(Self::format(record));
        }
    }

    fn flush(&self) {}
}

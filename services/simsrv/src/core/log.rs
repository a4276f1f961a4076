//! Per-device activity log
//!
//! A bounded ring of timestamped records. The newest entries win: when the
//! ring is full the oldest record is evicted.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Default ring capacity per device
pub const DEFAULT_LOG_CAPACITY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// One timestamped activity record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded activity log ring
#[derive(Debug)]
pub struct DeviceLog {
    capacity: usize,
    entries: Mutex<VecDeque<LogRecord>>,
}

impl DeviceLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Append a record, evicting the oldest when the ring is full
    pub fn append(&self, level: LogLevel, message: impl Into<String>) {
        let mut entries = self.entries.lock();
        if entries.len() == self.capacity {
            entries.pop_front();
        }
        entries.push_back(LogRecord {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        });
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<LogRecord> {
        self.entries.lock().iter().cloned().collect()
    }
}

impl Default for DeviceLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest_first() {
        let log = DeviceLog::new(3);
        for i in 0..5 {
            log.append(LogLevel::Info, format!("event {i}"));
        }

        let records = log.records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].message, "event 2");
        assert_eq!(records[2].message, "event 4");
    }

    #[test]
    fn test_records_ordered_oldest_first() {
        let log = DeviceLog::default();
        log.append(LogLevel::Info, "first");
        log.append(LogLevel::Error, "second");

        let records = log.records();
        assert_eq!(records[0].message, "first");
        assert_eq!(records[1].level, LogLevel::Error);
        assert!(records[0].timestamp <= records[1].timestamp);
    }
}

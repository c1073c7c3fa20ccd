//! Transfer progress accounting.
//!
//! # Design
//! A `ProgressMeter` turns a running byte count into percentage updates.
//! It only yields an update when the percentage strictly exceeds the last
//! one it yielded, so consumers never see duplicates and never see 0%.
//! A total of zero or less means the length is unknown (chunked bodies,
//! missing `Content-Length`): no percentage is computed while streaming
//! and a single 100% update is yielded by [`ProgressMeter::finish`].

/// One progress notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 1..=100
    pub percentage: u8,
    /// Declared body length, or a non-positive value when unknown.
    pub total_size: i64,
    pub bytes_read: u64,
}

/// Deduplicating percentage calculator for a single transfer.
#[derive(Debug, Clone)]
pub struct ProgressMeter {
    total: i64,
    last: u8,
    bytes_read: u64,
}

impl ProgressMeter {
    pub fn new(total: i64) -> Self {
        Self {
            total,
            last: 0,
            bytes_read: 0,
        }
    }

    pub fn is_length_known(&self) -> bool {
        self.total > 0
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Record the cumulative byte count. Returns an update when the
    /// percentage moved forward.
    pub fn advance(&mut self, bytes_read: u64) -> Option<Progress> {
        self.bytes_read = bytes_read;
        if !self.is_length_known() {
            return None;
        }
        let percentage = percentage_of(bytes_read, self.total as u64);
        self.emit(percentage)
    }

    /// Mark the transfer complete. Only unknown-length transfers produce
    /// an update here; known-length ones already reported as they streamed.
    pub fn finish(&mut self) -> Option<Progress> {
        if self.is_length_known() {
            return None;
        }
        self.emit(100)
    }

    fn emit(&mut self, percentage: u8) -> Option<Progress> {
        if percentage <= self.last {
            return None;
        }
        self.last = percentage;
        Some(Progress {
            percentage,
            total_size: self.total,
            bytes_read: self.bytes_read,
        })
    }
}

/// `min(100, floor(read * 100 / total))`; `total` must be positive.
fn percentage_of(read: u64, total: u64) -> u8 {
    if read >= total {
        return 100;
    }
    ((read as u128 * 100) / total as u128) as u8
}

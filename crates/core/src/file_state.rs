// SPDX-License-Identifier: MIT

//! Per-file tail state owned by the File Supervisor (spec.md §3).

use crate::labels::LabelMap;
use chrono::{DateTime, Utc};
use std::path::PathBuf;

/// OS-level fingerprint used to detect rotation/truncation and to
/// invalidate a stale position-store record across restarts (spec.md §4.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct FileFingerprint {
    pub inode: u64,
    pub device: u64,
}

/// One entry per monitored file.
#[derive(Debug, Clone)]
pub struct FileTailState {
    pub path: PathBuf,
    pub fingerprint: FileFingerprint,
    pub size_at_open: u64,
    /// Byte position of the next read.
    pub offset: u64,
    pub labels: LabelMap,
    pub last_read_at: Option<DateTime<Utc>>,
    pub last_mtime: Option<DateTime<Utc>>,
    /// Monotonic count of health-ticker "quiet" warnings already emitted,
    /// used to rate-limit the once-per-hour quiet log (spec.md §4.4.3).
    pub last_quiet_warn_at: Option<DateTime<Utc>>,
}

impl FileTailState {
    pub fn new(path: PathBuf, fingerprint: FileFingerprint, size_at_open: u64, offset: u64, labels: LabelMap) -> Self {
        Self {
            path,
            fingerprint,
            size_at_open,
            offset,
            labels,
            last_read_at: None,
            last_mtime: None,
            last_quiet_warn_at: None,
        }
    }

    /// True when the file was observed truncated behind the supervisor's
    /// back: current size is smaller than our recorded offset (spec.md §3
    /// invariant, §4.4.3 step 2).
    pub fn is_truncated(&self, current_size: u64) -> bool {
        current_size < self.offset
    }

    /// Resets tail position on a detected truncation/rotation
    /// (spec.md §3: "offset resets to 0 and the file is re-opened").
    pub fn reset_on_truncation(&mut self, new_fingerprint: FileFingerprint, new_size: u64) {
        self.fingerprint = new_fingerprint;
        self.size_at_open = new_size;
        self.offset = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp() -> FileFingerprint {
        FileFingerprint { inode: 1, device: 1 }
    }

    #[test]
    fn truncation_detected_when_size_below_offset() {
        let mut state = FileTailState::new(PathBuf::from("/tmp/a.log"), fp(), 1000, 1000, LabelMap::new());
        assert!(state.is_truncated(0));
        state.reset_on_truncation(fp(), 0);
        assert_eq!(state.offset, 0);
    }

    #[test]
    fn not_truncated_when_size_grew() {
        let state = FileTailState::new(PathBuf::from("/tmp/a.log"), fp(), 1000, 1000, LabelMap::new());
        assert!(!state.is_truncated(2000));
    }
}

// SPDX-License-Identifier: MIT

//! Position-store record shape (spec.md §3, §4.2).

use crate::file_state::FileFingerprint;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub path: PathBuf,
    pub offset: u64,
    pub size: u64,
    pub mtime: DateTime<Utc>,
    pub fingerprint: FileFingerprint,
    pub bytes_read_total: u64,
    pub lines_read_total: u64,
    pub updated_at: DateTime<Utc>,
}

impl PositionRecord {
    /// True when `fingerprint` no longer matches the file currently at
    /// `path` — the file was rotated while the agent was down (spec.md §4.2).
    pub fn is_stale(&self, current: FileFingerprint) -> bool {
        self.fingerprint != current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(inode: u64) -> FileFingerprint {
        FileFingerprint { inode, device: 1 }
    }

    #[test]
    fn stale_when_fingerprint_differs() {
        let record = PositionRecord {
            path: PathBuf::from("/a.log"),
            offset: 10,
            size: 10,
            mtime: DateTime::UNIX_EPOCH,
            fingerprint: fp(1),
            bytes_read_total: 10,
            lines_read_total: 1,
            updated_at: DateTime::UNIX_EPOCH,
        };
        assert!(record.is_stale(fp(2)));
        assert!(!record.is_stale(fp(1)));
    }
}

// SPDX-License-Identifier: MIT

//! Identifier helpers: source-id hashing and trace-id assignment.

use sha2::{Digest, Sha256};
use std::path::Path;
use uuid::Uuid;

/// Short opaque identifier for a file source: first 12 hex chars of the
/// SHA-256 of its absolute path (spec.md §3).
pub fn file_source_id(absolute_path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(absolute_path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    hex_prefix(&digest, 12)
}

/// Short opaque identifier for a container source: first 12 chars of the
/// container id (spec.md §3).
pub fn container_source_id(container_id: &str) -> String {
    short(container_id, 12).to_string()
}

/// Returns a string slice truncated to at most `n` characters.
pub fn short(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take((n + 1) / 2).map(|b| format!("{b:02x}")).collect::<String>()[..n].to_string()
}

/// Assigns a fresh trace id to an ingested record (spec.md §3).
pub fn new_trace_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_source_id_is_stable_and_twelve_chars() {
        let a = file_source_id(Path::new("/var/log/app.log"));
        let b = file_source_id(Path::new("/var/log/app.log"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 12);
    }

    #[test]
    fn file_source_id_differs_for_different_paths() {
        let a = file_source_id(Path::new("/var/log/a.log"));
        let b = file_source_id(Path::new("/var/log/b.log"));
        assert_ne!(a, b);
    }

    #[test]
    fn container_source_id_truncates_to_twelve() {
        let id = container_source_id("abcdef0123456789fedcba");
        assert_eq!(id, "abcdef012345");
    }

    #[test]
    fn container_source_id_keeps_short_ids_whole() {
        assert_eq!(container_source_id("short"), "short");
    }
}

// SPDX-License-Identifier: MIT

//! Host identity used for the `instance`/`instance_name` labels mandated
//! on every record (spec.md §6). Resolved once at supervisor construction,
//! never per-record.

use std::net::UdpSocket;

/// Best-effort hostname: falls back to `"unknown"` rather than failing
/// supervisor construction over a missing `/etc/hostname`.
pub fn detect_hostname() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.is_empty() {
            return name;
        }
    }
    std::process::Command::new("hostname")
        .output()
        .ok()
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Best-effort primary IPv4 address: a UDP "connect" only resolves a
/// route, it never sends a packet, so this has no network side effect.
pub fn detect_host_ipv4() -> String {
    UdpSocket::bind("0.0.0.0:0")
        .and_then(|socket| {
            socket.connect("8.8.8.8:80")?;
            socket.local_addr()
        })
        .map(|addr| addr.ip().to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

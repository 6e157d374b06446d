// SPDX-License-Identifier: MIT

//! Environment-variable access for process-level settings not covered by
//! the YAML `Configuration` (spec.md §6): where the config file and the
//! position-store snapshot live, the service name stamped onto every
//! record, and the shutdown deadline. Grounded in the teacher's
//! `env.rs`, which centralizes `OJ_*` lookups the same way.

use std::path::PathBuf;
use std::time::Duration;

/// Path to the YAML configuration document (default `./ltap.yaml`).
pub fn config_path() -> PathBuf {
    std::env::var("LTAP_CONFIG_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("ltap.yaml"))
}

/// Path to the position store's snapshot file.
pub fn position_store_path() -> PathBuf {
    std::env::var("LTAP_POSITION_STORE_PATH").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("ltap-positions.json"))
}

/// `service` label stamped on every record (spec.md §6).
pub fn service_name() -> String {
    std::env::var("LTAP_SERVICE_NAME").unwrap_or_else(|_| "ltap".to_string())
}

/// Bounded wait for registered tasks on shutdown (spec.md §5, default 10 s).
pub fn shutdown_deadline() -> Duration {
    std::env::var("LTAP_SHUTDOWN_DEADLINE_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(10))
}

/// Position store flush interval.
pub fn position_flush_interval() -> Duration {
    std::env::var("LTAP_POSITION_FLUSH_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(5))
}

/// Task Manager watchdog scan interval (spec.md §9: "recommended 2 min").
pub fn watchdog_interval() -> Duration {
    std::env::var("LTAP_WATCHDOG_INTERVAL_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(120))
}

/// Task Manager unhealthy threshold (spec.md §4.1, default 2 min).
pub fn watchdog_threshold() -> Duration {
    std::env::var("LTAP_WATCHDOG_THRESHOLD_MS")
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(Duration::from_secs(120))
}

/// Bundle of the settings above, resolved once at startup.
#[derive(Debug, Clone)]
pub struct Settings {
    pub config_path: PathBuf,
    pub position_store_path: PathBuf,
    pub service_name: String,
    pub shutdown_deadline: Duration,
    pub position_flush_interval: Duration,
    pub watchdog_interval: Duration,
    pub watchdog_threshold: Duration,
}

impl Settings {
    pub fn from_env() -> Self {
        Self {
            config_path: config_path(),
            position_store_path: position_store_path(),
            service_name: service_name(),
            shutdown_deadline: shutdown_deadline(),
            position_flush_interval: position_flush_interval(),
            watchdog_interval: watchdog_interval(),
            watchdog_threshold: watchdog_threshold(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn config_path_falls_back_to_default_when_unset() {
        std::env::remove_var("LTAP_CONFIG_PATH");
        assert_eq!(config_path(), PathBuf::from("ltap.yaml"));
    }

    #[test]
    #[serial]
    fn shutdown_deadline_parses_override() {
        std::env::set_var("LTAP_SHUTDOWN_DEADLINE_MS", "2500");
        assert_eq!(shutdown_deadline(), Duration::from_millis(2500));
        std::env::remove_var("LTAP_SHUTDOWN_DEADLINE_MS");
    }
}

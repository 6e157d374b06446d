// SPDX-License-Identifier: MIT

pub mod raw;
pub mod validate;

pub use raw::{parse_yaml, RawConfig};
pub use validate::{
    Configuration, ConfigError, ContainerSupervisorConfig, DispatcherConfig, FeedbackGuardConfig,
    FileSupervisorConfig, PipelineEntry, RetryConfig, SeekStrategy, validate,
};

/// Parses and validates a configuration document in one call — the
/// boundary `ltap-daemon::Application::new` uses (spec.md §9).
pub fn load(yaml: &str) -> Result<Configuration, ConfigError> {
    let raw = parse_yaml(yaml)?;
    validate(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_rejects_malformed_yaml() {
        assert!(load("not: [valid").is_err());
    }

    #[test]
    fn load_accepts_minimal_document() {
        let config = load("dispatcher:\n  workers: 3\n").unwrap();
        assert_eq!(config.dispatcher.workers, 3);
    }
}

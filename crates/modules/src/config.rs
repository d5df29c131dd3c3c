//! Module configuration.
//!
//! Floors and policy switches shared by every account using a module
//! instance. Loaded from TOML, every field has a default:
//!
//! ```toml
//! [delayed_executor]
//! min_delay = 86400
//! min_expiration = 86400
//! min_setback = 432000
//! cancel_expired_operations = true
//!
//! [recovery_guardian]
//! min_timelock = 86400
//! ```

use serde::{Deserialize, Serialize};

/// One day, in seconds.
pub const DAY: u64 = 86_400;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse module config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid module config: {0}")]
    Invalid(&'static str),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModuleConfig {
    pub delayed_executor: DelayedExecutorConfig,
    pub recovery_guardian: RecoveryGuardianConfig,
}

impl ModuleConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.delayed_executor.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DelayedExecutorConfig {
    /// Floor applied to every configured delay, in seconds.
    pub min_delay: u64,
    /// Floor applied to every configured expiration, in seconds.
    pub min_expiration: u64,
    /// Minimum time before a delay or expiration update takes effect, in seconds.
    pub min_setback: u64,
    /// Whether expired, unexecuted operations may still be canceled (and so
    /// scheduled again under the same id).
    pub cancel_expired_operations: bool,
}

impl Default for DelayedExecutorConfig {
    fn default() -> Self {
        Self {
            min_delay: DAY,
            min_expiration: DAY,
            min_setback: 5 * DAY,
            cancel_expired_operations: true,
        }
    }
}

impl DelayedExecutorConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.min_expiration == 0 {
            return Err(ConfigError::Invalid(
                "delayed_executor.min_expiration must be non-zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RecoveryGuardianConfig {
    /// Shortest timelock an account may configure, in seconds.
    pub min_timelock: u64,
}

impl Default for RecoveryGuardianConfig {
    fn default() -> Self {
        Self { min_timelock: DAY }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = ModuleConfig::from_toml_str("").unwrap();
        assert_eq!(config, ModuleConfig::default());
        assert_eq!(config.delayed_executor.min_delay, DAY);
        assert!(config.delayed_executor.cancel_expired_operations);
    }

    #[test]
    fn test_partial_override() {
        let config = ModuleConfig::from_toml_str(
            r#"
            [delayed_executor]
            min_delay = 0
            cancel_expired_operations = false

            [recovery_guardian]
            min_timelock = 3600
            "#,
        )
        .unwrap();

        assert_eq!(config.delayed_executor.min_delay, 0);
        assert_eq!(config.delayed_executor.min_setback, 5 * DAY);
        assert!(!config.delayed_executor.cancel_expired_operations);
        assert_eq!(config.recovery_guardian.min_timelock, 3600);
    }

    #[test]
    fn test_unknown_fields_are_rejected() {
        let err = ModuleConfig::from_toml_str("[delayed_executor]\nmin_dealy = 1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_zero_expiration_floor_is_invalid() {
        let err =
            ModuleConfig::from_toml_str("[delayed_executor]\nmin_expiration = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}

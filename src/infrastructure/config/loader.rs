use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use thiserror::Error;

use crate::domain::models::config::Config;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid feature_dim: {0}. Must be at least 1")]
    InvalidFeatureDim(usize),

    #[error("Invalid {name}: {value}. Must be within [0, 1]")]
    OutOfUnitRange { name: &'static str, value: f64 },

    #[error("Invalid {name}: {value}. Must be positive")]
    NotPositive { name: &'static str, value: f64 },

    #[error("Invalid budget for {resource}: {capacity}. Must be finite and non-negative")]
    InvalidBudget { resource: String, capacity: f64 },

    #[error("Invalid max_golden_templates: {0}. Must be at least 1")]
    InvalidTemplateCapacity(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .strategos/config.yaml (project config)
    /// 3. .strategos/local.yaml (project local overrides, optional)
    /// 4. Environment variables (STRATEGOS_* prefix, `__` separates nested keys)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(".strategos/config.yaml"))
            .merge(Yaml::file(".strategos/local.yaml"))
            .merge(Env::prefixed("STRATEGOS_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<std::path::Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .context(format!(
                "Failed to load config from {}",
                path.as_ref().display()
            ))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.feature_dim == 0 {
            return Err(ConfigError::InvalidFeatureDim(config.feature_dim));
        }

        let unit_fields = [
            ("culling_threshold", config.culling_threshold),
            ("golden_success_rate_threshold", config.golden_success_rate_threshold),
            ("golden.stability_ratio", config.golden.stability_ratio),
            ("golden.min_stability_score", config.golden.min_stability_score),
            ("golden.match_threshold", config.golden.match_threshold),
            ("golden.revoke_margin", config.golden.revoke_margin),
            ("verification.claim_confidence", config.verification.claim_confidence),
        ];
        for (name, value) in unit_fields {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfUnitRange { name, value });
            }
        }

        let positive_fields = [
            ("bandit.linucb_alpha", config.bandit.linucb_alpha),
            ("bandit.thompson_alpha", config.bandit.thompson_alpha),
            ("bandit.thompson_beta", config.bandit.thompson_beta),
            ("trial.recovery_factor", config.trial.recovery_factor),
            ("trial.severe_factor", config.trial.severe_factor),
        ];
        for (name, value) in positive_fields {
            // Written as a negation so NaN is rejected too.
            if !(value > 0.0) {
                return Err(ConfigError::NotPositive { name, value });
            }
        }

        for (resource, capacity) in &config.global_budget {
            if !capacity.is_finite() || *capacity < 0.0 {
                return Err(ConfigError::InvalidBudget {
                    resource: resource.clone(),
                    capacity: *capacity,
                });
            }
        }

        if config.max_golden_templates == 0 {
            return Err(ConfigError::InvalidTemplateCapacity(config.max_golden_templates));
        }

        if config.golden.stability_window == 0 {
            return Err(ConfigError::ValidationFailed(
                "golden.stability_window must be at least 1".to_string(),
            ));
        }

        if config.verification.health_cache_ttl_secs < 0 {
            return Err(ConfigError::ValidationFailed(format!(
                "verification.health_cache_ttl_secs cannot be negative: {}",
                config.verification.health_cache_ttl_secs
            )));
        }

        if config.verification.default_budget_cost < 0.0 || config.verification.default_time_estimate < 0.0 {
            return Err(ConfigError::ValidationFailed(
                "verification defaults cannot be negative".to_string(),
            ));
        }

        // Validate database config
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(
                config.database.max_connections,
            ));
        }

        // Validate logging config
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::config::BanditAlgorithmKind;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.feature_dim, 8);
        assert_eq!(config.algorithm, BanditAlgorithmKind::Linucb);
        assert_eq!(config.exploration_boost_rounds, 10);
        assert!((config.culling_threshold - 0.30).abs() < f64::EPSILON);
        assert_eq!(config.culling_min_samples, 15);
        assert_eq!(config.golden_min_samples, 20);
        assert_eq!(config.max_golden_templates, 50);
        assert!((config.global_budget["cost_dollars"] - 5.0).abs() < f64::EPSILON);
        assert_eq!(config.database.path, ".strategos/strategos.db");
        assert_eq!(config.logging.level, "info");
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
algorithm: thompson
exploration_boost_rounds: 5
global_budget:
  cost_dollars: 2.5
bandit:
  thompson_beta: 2.0
  seed: 7
golden:
  match_threshold: 0.9
logging:
  level: debug
  format: pretty
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.algorithm, BanditAlgorithmKind::Thompson);
        assert_eq!(config.exploration_boost_rounds, 5);
        assert_eq!(config.global_budget.len(), 1);
        assert_eq!(config.bandit.seed, Some(7));
        assert!((config.bandit.thompson_alpha - 1.0).abs() < f64::EPSILON);
        assert!((config.golden.match_threshold - 0.9).abs() < f64::EPSILON);
        assert_eq!(config.golden.stability_window, 20);
        assert_eq!(config.logging.format, "pretty");

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_zero_feature_dim() {
        let config = Config {
            feature_dim: 0,
            ..Default::default()
        };
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidFeatureDim(0))
        ));
    }

    #[test]
    fn test_validate_threshold_out_of_range() {
        let config = Config {
            culling_threshold: 1.5,
            ..Default::default()
        };
        match ConfigLoader::validate(&config) {
            Err(ConfigError::OutOfUnitRange { name, .. }) => assert_eq!(name, "culling_threshold"),
            other => panic!("Expected OutOfUnitRange, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_nan_alpha() {
        let mut config = Config::default();
        config.bandit.linucb_alpha = f64::NAN;
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::NotPositive { name: "bandit.linucb_alpha", .. })
        ));
    }

    #[test]
    fn test_validate_negative_budget() {
        let mut config = Config::default();
        config.global_budget.insert("api_calls".to_string(), -1.0);
        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidBudget { resource, .. }) => assert_eq!(resource, "api_calls"),
            other => panic!("Expected InvalidBudget, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config) {
            Err(ConfigError::InvalidLogLevel(level)) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_invalid_rotation() {
        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::InvalidRotation(_))
        ));
    }

    #[test]
    fn test_validate_empty_database_path() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config),
            Err(ConfigError::EmptyDatabasePath)
        ));
    }

    #[test]
    fn test_env_override() {
        temp_env::with_vars(
            [
                ("STRATEGOS_ALGORITHM", Some("thompson")),
                ("STRATEGOS_CULLING_MIN_SAMPLES", Some("25")),
                ("STRATEGOS_GLOBAL_BUDGET__COST_DOLLARS", Some("2.5")),
                ("STRATEGOS_LOGGING__LEVEL", Some("debug")),
            ],
            || {
                let config = ConfigLoader::load().expect("env config should load");
                assert_eq!(config.algorithm, BanditAlgorithmKind::Thompson);
                assert_eq!(config.culling_min_samples, 25);
                assert!((config.global_budget["cost_dollars"] - 2.5).abs() < f64::EPSILON);
                assert!(config.global_budget.contains_key("time_seconds"));
                assert_eq!(config.logging.level, "debug");
            },
        );
    }

    #[test]
    fn test_env_override_rejected_by_validation() {
        temp_env::with_var("STRATEGOS_GOLDEN__MATCH_THRESHOLD", Some("3.0"), || {
            assert!(ConfigLoader::load().is_err());
        });
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "max_golden_templates: 5\ntrial:\n  watch_duration_secs: 600").expect("write");
        file.flush().expect("flush");

        let config = ConfigLoader::load_from_file(file.path()).expect("load");
        assert_eq!(config.max_golden_templates, 5);
        assert_eq!(config.trial.watch_duration_secs, 600);
        assert_eq!(config.trial.protection_window_secs, 3600);
    }

    #[test]
    fn test_load_from_file_invalid() {
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "database:\n  max_connections: 0").expect("write");
        file.flush().expect("flush");

        let err = ConfigLoader::load_from_file(file.path()).expect_err("invalid");
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }

    #[test]
    fn test_hierarchical_merging() {
        let mut base_file = NamedTempFile::new().expect("temp file");
        writeln!(
            base_file,
            "exploration_boost_rounds: 5\nlogging:\n  level: info\n  format: json"
        )
        .expect("write");
        base_file.flush().expect("flush");

        let mut override_file = NamedTempFile::new().expect("temp file");
        writeln!(override_file, "exploration_boost_rounds: 15\nlogging:\n  level: debug").expect("write");
        override_file.flush().expect("flush");

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(base_file.path()))
            .merge(Yaml::file(override_file.path()))
            .extract()
            .expect("extract");

        assert_eq!(config.exploration_boost_rounds, 15, "Override should win");
        assert_eq!(
            config.logging.level, "debug",
            "Override should win for nested fields"
        );
        assert_eq!(
            config.logging.format, "json",
            "Base value should persist when not overridden"
        );
    }
}

use std::path::Path;

use crate::config::schema::{ServiceConfig, MAX_RETENTION_HOURS};
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../../../schema/config-v1.json");

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

/// Parses, schema-checks and validates a JSON config.
///
/// An `instance` preset is applied last and wins over the explicit upload,
/// model and memory ceilings in the same document.
pub fn load_config_from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let mut config: ServiceConfig = serde_json::from_value(json_value)?;

    if let Some(instance) = config.instance {
        config.apply_instance_preset(instance);
    }

    validate_config(&config)?;

    Ok(config)
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();

    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

/// Semantic checks that apply after presets, so they cannot live in the schema.
pub fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.max_upload_bytes == 0 {
        return Err(ConfigError::Validation {
            message: "max_upload_bytes must be greater than zero".to_string(),
        });
    }

    if config.worker_count == 0 {
        return Err(ConfigError::Validation {
            message: "worker_count must be at least 1".to_string(),
        });
    }

    if config.queue_capacity == 0 {
        return Err(ConfigError::Validation {
            message: "queue_capacity must be at least 1".to_string(),
        });
    }

    if config.inference_timeout_secs == 0 || config.model.load_timeout_secs == 0 {
        return Err(ConfigError::Validation {
            message: "timeouts must be at least one second".to_string(),
        });
    }

    if config.retention_hours == 0 || config.retention_hours > MAX_RETENTION_HOURS {
        return Err(ConfigError::Validation {
            message: format!(
                "retention_hours must be within 1..={}, got {}",
                MAX_RETENTION_HOURS, config.retention_hours
            ),
        });
    }
    config.retention()?;

    if config.sweep_interval_secs == Some(0) {
        return Err(ConfigError::Validation {
            message: "sweep_interval_secs must be at least 1 when set".to_string(),
        });
    }

    if let (Some(warning), Some(critical)) = (config.memory.warning_mb, config.memory.critical_mb)
    {
        if warning > critical {
            return Err(ConfigError::Validation {
                message: format!(
                    "memory.warning_mb ({}) exceeds memory.critical_mb ({})",
                    warning, critical
                ),
            });
        }
    }

    if !(0.0..=1.0).contains(&config.decoding.temperature) {
        return Err(ConfigError::Validation {
            message: format!(
                "decoding.temperature must be within 0..=1, got {}",
                config.decoding.temperature
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{InstanceType, LoadPolicy};
    use crate::engine::ModelTier;

    #[test]
    fn test_load_empty_config_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config.max_upload_bytes, 100 * 1024 * 1024);
        assert_eq!(config.inference_timeout_secs, 300);
        assert_eq!(config.retention_hours, 24);
        assert_eq!(config.model.preferred_tier, ModelTier::Base);
    }

    #[test]
    fn test_load_full_config() {
        let config_json = r#"
        {
            "work_directory": "/var/lib/audiosub",
            "max_upload_bytes": 1048576,
            "worker_count": 2,
            "queue_capacity": 8,
            "inference_timeout_secs": 60,
            "retention_hours": 6,
            "sweep_interval_secs": 300,
            "release_on_download": true,
            "model": {
                "preferred_tier": "medium",
                "policy": "fixed",
                "load_timeout_secs": 30,
                "model_directory": "/models"
            },
            "decoding": {
                "language": "de",
                "temperature": 0.2,
                "threads": 4
            },
            "memory": { "warning_mb": 900, "critical_mb": 1000 }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.worker_count, 2);
        assert_eq!(config.queue_capacity, 8);
        assert_eq!(config.sweep_interval_secs, Some(300));
        assert!(config.release_on_download);
        assert_eq!(config.model.preferred_tier, ModelTier::Medium);
        assert_eq!(config.model.policy, LoadPolicy::Fixed);
        assert_eq!(config.decoding.language.as_deref(), Some("de"));
        assert_eq!(config.decoding.threads, Some(4));
        assert_eq!(config.memory.critical_mb, Some(1000));
    }

    #[test]
    fn test_instance_preset_overrides_explicit_values() {
        let config_json = r#"
        {
            "max_upload_bytes": 999999999,
            "instance": "free",
            "model": { "preferred_tier": "large" }
        }
        "#;

        let config = load_config_from_str(config_json).unwrap();
        assert_eq!(config.instance, Some(InstanceType::Free));
        assert_eq!(config.max_upload_bytes, 10 * 1024 * 1024);
        assert_eq!(config.model.preferred_tier, ModelTier::Tiny);
    }

    #[test]
    fn test_schema_rejects_unknown_tier() {
        let result = load_config_from_str(r#"{ "model": { "preferred_tier": "gigantic" } }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_unknown_field() {
        let result = load_config_from_str(r#"{ "allowed_extensions": ["txt"] }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_zero_workers() {
        let result = load_config_from_str(r#"{ "worker_count": 0 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));
    }

    #[test]
    fn test_schema_rejects_huge_retention() {
        let result = load_config_from_str(r#"{ "retention_hours": 10000000000000000 }"#);
        assert!(matches!(result, Err(ConfigError::SchemaValidation { .. })));

        let config = load_config_from_str(r#"{ "retention_hours": 87600 }"#).unwrap();
        assert_eq!(config.retention().unwrap(), chrono::Duration::hours(87600));
    }

    #[test]
    fn test_validate_rejects_retention_above_ceiling() {
        for hours in [MAX_RETENTION_HOURS + 1, u64::MAX] {
            let config = ServiceConfig {
                retention_hours: hours,
                ..ServiceConfig::default()
            };
            assert!(matches!(
                validate_config(&config),
                Err(ConfigError::Validation { .. })
            ));
        }
    }

    #[test]
    fn test_warning_above_critical_is_rejected() {
        let result =
            load_config_from_str(r#"{ "memory": { "warning_mb": 500, "critical_mb": 400 } }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_load_config_missing_file() {
        let result = load_config("/nonexistent/audiosub.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}

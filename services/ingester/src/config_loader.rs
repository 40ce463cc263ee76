//! Configuration loader for the ingester.
//!
//! Reads the YAML configuration file, substituting environment variables
//! written as `${VAR}` or `${VAR:-default}` before parsing.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use crate::config::IngesterConfig;

/// Load, expand and validate a configuration file.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<IngesterConfig> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

    if let Some(forecast) = config.forecast.as_mut() {
        forecast.model_path = shellexpand::tilde(&forecast.model_path).into_owned();
    }

    config.validate()?;
    Ok(config)
}

/// Parse configuration from YAML text.
pub fn parse_config(content: &str) -> Result<IngesterConfig> {
    let expanded = expand_env_vars(content)?;
    let config: IngesterConfig = serde_yaml::from_str(&expanded)?;
    Ok(config)
}

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in YAML content
/// Supports ${VAR} and ${VAR:-default} syntax
fn expand_env_vars(content: &str) -> Result<String> {
    let mut result = String::with_capacity(content.len());
    let mut chars = content.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'

            let mut var_expr = String::new();
            let mut depth = 1;

            while depth > 0 {
                match chars.next() {
                    Some('{') => {
                        depth += 1;
                        var_expr.push('{');
                    }
                    Some('}') => {
                        depth -= 1;
                        if depth > 0 {
                            var_expr.push('}');
                        }
                    }
                    Some(c) => var_expr.push(c),
                    None => anyhow::bail!("Unclosed variable substitution: ${{{}", var_expr),
                }
            }

            result.push_str(&resolve_var_expr(&var_expr)?);
        } else {
            result.push(ch);
        }
    }

    Ok(result)
}

/// Resolve `VAR` or `VAR:-default`.
fn resolve_var_expr(expr: &str) -> Result<String> {
    if let Some((var_name, default)) = expr.split_once(":-") {
        match std::env::var(var_name.trim()) {
            Ok(val) if !val.is_empty() => Ok(val),
            _ => Ok(default.to_string()),
        }
    } else {
        std::env::var(expr.trim()).with_context(|| format!("Environment variable {} not set", expr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestion::PublishMode;
    use std::io::Write;

    const SAMPLE: &str = r#"
queue:
  url: ${INGESTER_TEST_QUEUE_URL:-https://sqs.eu-west-1.amazonaws.com/000000000000/test}
  max_messages: 5
source:
  bucket: aws-earth-mo-atmospheric-mogreps-uk-prd
  skip_signature: true
destination:
  storage:
    bucket: ${INGESTER_TEST_BUCKET}
  base_path: uk-metoffice-nwp
  conditional_writes: true
catalog:
  - name: wind_speed
    heights: [10.0, 50.0, 100.0, 150.0]
  - name: surface_downwelling_shortwave_flux_in_air
forecast:
  model_path: ~/models/pv_systems.csv
"#;

    #[test]
    fn test_expand_env_vars_simple() {
        std::env::set_var("INGESTER_TEST_SIMPLE", "test_value");
        let result = expand_env_vars("prefix_${INGESTER_TEST_SIMPLE}_suffix").unwrap();
        assert_eq!(result, "prefix_test_value_suffix");
    }

    #[test]
    fn test_expand_env_vars_with_default() {
        std::env::remove_var("INGESTER_TEST_UNSET");
        let result = expand_env_vars("value_${INGESTER_TEST_UNSET:-default}_end").unwrap();
        assert_eq!(result, "value_default_end");
    }

    #[test]
    fn test_expand_env_vars_missing_required() {
        std::env::remove_var("INGESTER_TEST_REQUIRED");
        assert!(expand_env_vars("${INGESTER_TEST_REQUIRED}").is_err());
    }

    #[test]
    fn test_expand_env_vars_unclosed() {
        assert!(expand_env_vars("${INGESTER_TEST_SIMPLE").is_err());
    }

    #[test]
    fn test_resolve_var_expr_empty_uses_default() {
        std::env::set_var("INGESTER_TEST_EMPTY", "");
        assert_eq!(resolve_var_expr("INGESTER_TEST_EMPTY:-20").unwrap(), "20");
    }

    #[test]
    fn test_load_sample_config() {
        std::env::set_var("INGESTER_TEST_BUCKET", "my-nwp-bucket");
        std::env::remove_var("INGESTER_TEST_QUEUE_URL");

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = load_config(file.path()).unwrap();

        assert_eq!(
            config.queue.url,
            "https://sqs.eu-west-1.amazonaws.com/000000000000/test"
        );
        assert_eq!(config.queue.max_messages, 5);
        assert_eq!(config.queue.wait_time_secs, 20);
        assert!(config.source.skip_signature);
        assert_eq!(config.destination.storage.bucket, "my-nwp-bucket");
        assert_eq!(config.destination.publish_mode(), PublishMode::Conditional);
        assert_eq!(config.catalog.len(), 2);
        assert_eq!(config.max_receive_count, 10);

        let forecast = config.forecast.unwrap();
        assert!(!forecast.model_path.starts_with('~'));
        assert!(forecast.model_path.ends_with("models/pv_systems.csv"));
        assert_eq!(forecast.results_prefix, "pv_predictions");
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"queue:\n  max_messages: 11\n").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}

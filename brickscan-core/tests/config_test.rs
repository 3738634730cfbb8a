use brickscan_core::{BrickscanConfig, Category, ConfigError, EnrichmentScope};
use std::io::Write;

fn write_config(suffix: &str, content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_yaml_file() {
    let file = write_config(
        ".yaml",
        r#"
pipeline:
  min_area: 250
  category: sets
  enrichment_scope: all
catalog:
  base_url: "http://localhost:9000/api/v3/lego"
  timeout_secs: 3
  min_interval_ms: 0
"#,
    );
    let config = BrickscanConfig::from_file(file.path()).unwrap();

    assert_eq!(config.pipeline.min_area, 250.0);
    assert_eq!(config.pipeline.max_area, 100_000.0);
    assert_eq!(config.pipeline.category, Category::Sets);
    assert_eq!(config.pipeline.enrichment_scope, EnrichmentScope::All);
    assert_eq!(config.catalog.endpoint(), "http://localhost:9000/api/v3/lego");
    assert_eq!(config.catalog.retry.max_retries, 2);
    assert!(config.catalog.api_key.is_none());
    config.validate().unwrap();
}

#[test]
fn test_load_toml_file_keeps_unset_sections() {
    let file = write_config(
        ".toml",
        r#"
[pipeline]
padding = 4
top_n = 1
use_enrichment = false
"#,
    );
    let config = BrickscanConfig::from_file(file.path()).unwrap();
    let defaults = BrickscanConfig::default();

    assert_eq!(config.pipeline.padding, 4);
    assert_eq!(config.pipeline.top_n, 1);
    assert!(!config.pipeline.use_enrichment);
    assert_eq!(config.identification, defaults.identification);
    assert_eq!(config.catalog, defaults.catalog);
}

#[test]
fn test_invalid_band_fails_validation() {
    let file = write_config(".json", r#"{"pipeline": {"min_area": 900, "max_area": 100}}"#);
    let config = BrickscanConfig::from_file(file.path()).unwrap();

    assert!(matches!(config.validate(), Err(ConfigError::Validation(_))));
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = BrickscanConfig::from_file(dir.path().join("absent.toml"));

    assert!(matches!(result, Err(ConfigError::Io(_))));
}

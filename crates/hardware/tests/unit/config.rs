//! # Configuration Tests
//!
//! Defaults, partial JSON documents and validation.

use pretty_assertions::assert_eq;

use smpsim_core::common::data::CoreId;
use smpsim_core::common::error::SimError;
use smpsim_core::config::*;

#[test]
fn test_config_default() {
    let config = Config::default();
    assert_eq!(config.general.max_quantum, 20);
    assert!(!config.general.trace);
    assert_eq!(config.memory.latency, 40);
    assert_eq!(config.cache.core0_lines, 8);
    assert_eq!(config.cache.core1_lines, 4);
}

#[test]
fn test_cache_lines_per_core() {
    let cache = CacheConfig::default();
    assert_eq!(cache.lines(CoreId::HIDING), 8);
    assert_eq!(cache.lines(CoreId::BLOCKING), 4);
}

#[test]
fn test_from_json_fills_missing_sections() {
    let config = Config::from_json(r#"{ "memory": { "latency": 10 } }"#).unwrap();
    assert_eq!(config.memory.latency, 10);
    assert_eq!(config.general, GeneralConfig::default());
    assert_eq!(config.cache, CacheConfig::default());
}

#[test]
fn test_from_json_fills_missing_fields() {
    let config = Config::from_json(r#"{ "cache": { "core1_lines": 2 } }"#).unwrap();
    assert_eq!(config.cache.core0_lines, 8);
    assert_eq!(config.cache.core1_lines, 2);
}

#[test]
fn test_from_json_round_trips_serialized_config() {
    let mut config = Config::default();
    config.general.max_quantum = 3;
    config.general.trace = true;
    let text = serde_json::to_string(&config).unwrap();
    assert_eq!(Config::from_json(&text).unwrap(), config);
}

#[test]
fn test_from_json_rejects_bad_document() {
    assert!(matches!(
        Config::from_json(r#"{ "general": { "max_quantum": "many" } }"#),
        Err(SimError::InvalidConfig(_))
    ));
    assert!(matches!(Config::from_json("{"), Err(SimError::InvalidConfig(_))));
}

#[test]
fn test_validate_accepts_defaults() {
    Config::default().validate().unwrap();
}

#[test]
fn test_validate_rejects_zero_quantum() {
    let mut config = Config::default();
    config.general.max_quantum = 0;
    assert!(matches!(config.validate(), Err(SimError::InvalidConfig(_))));
}

#[test]
fn test_validate_rejects_empty_cache() {
    let mut config = Config::default();
    config.cache.core1_lines = 0;
    let err = config.validate().unwrap_err();
    assert!(err.to_string().contains("core 1"));
}

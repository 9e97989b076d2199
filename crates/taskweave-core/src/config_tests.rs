//! Configuration tests

use crate::chains::{ErrorStrategy, ExecutionSettings};
use crate::config::Config;

#[test]
fn test_default_config_is_valid() {
    let config = Config::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.chains.error_strategy, "fail_fast");
    assert_eq!(config.provider.kind, "current_execution");
}

#[test]
fn test_unknown_error_strategy_is_rejected() {
    let mut config = Config::default();
    config.chains.error_strategy = "give_up".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_temperature_out_of_range_is_rejected() {
    let mut config = Config::default();
    config.provider.temperature = 2.5;
    assert!(config.validate().is_err());
}

#[test]
fn test_api_key_in_config_is_rejected() {
    let mut config = Config::default();
    config.provider.api_key = Some("sk-or-secret".to_string());
    assert!(config.provider.enforce_env_only().is_err());
    assert!(config.validate().is_err());
}

#[test]
fn test_config_round_trips_through_toml() {
    let mut config = Config::default();
    config.chains.max_retries = 5;
    config.provider.model = "some/other-model".to_string();

    let serialized = toml::to_string_pretty(&config).unwrap();
    let parsed: Config = toml::from_str(&serialized).unwrap();
    assert_eq!(parsed.chains.max_retries, 5);
    assert_eq!(parsed.provider.model, "some/other-model");
    // The key is never part of the file format.
    assert!(!serialized.contains("api_key"));
    assert!(parsed.provider.api_key.is_none());
}

#[test]
fn test_explicit_data_dir_wins() {
    let mut config = Config::default();
    config.storage.data_dir = Some("/tmp/taskweave-test".into());
    assert_eq!(
        config.data_dir().unwrap(),
        std::path::PathBuf::from("/tmp/taskweave-test")
    );
}

#[test]
fn test_execution_settings_from_config() {
    let mut config = Config::default();
    config.chains.error_strategy = "skip_on_error".to_string();
    config.chains.max_retries = 4;

    let settings = ExecutionSettings::from_config(&config.chains).unwrap();
    assert_eq!(settings.error_strategy, ErrorStrategy::SkipOnError);
    assert_eq!(settings.max_retries, 4);

    config.chains.error_strategy = "nonsense".to_string();
    assert!(ExecutionSettings::from_config(&config.chains).is_err());
}

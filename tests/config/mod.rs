//! Configuration layering and fleet definition loading

use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

use haul_core::config::{ConfigManager, ConfigurationError, FleetConfig, QueueConfig};
use haul_core::delay::{DelayPhase, DelayRule};
use haul_core::models::{DelayCategory, ExcavatorStatus, RoadCondition, Shift, WeatherCondition};
use haul_core::registry::{FleetDefinition, ReferenceCatalog};

fn repo_config_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config")
}

fn write_config(base: &str, environment: Option<(&str, &str)>) -> TempDir {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("fleet.toml"), base).unwrap();
    if let Some((name, contents)) = environment {
        fs::create_dir_all(dir.path().join("environments")).unwrap();
        fs::write(dir.path().join("environments").join(format!("{name}.toml")), contents).unwrap();
    }
    dir
}

#[test]
fn test_shipped_environments_load_and_validate() {
    for environment in ["development", "test", "production"] {
        let manager = ConfigManager::load_from_directory_with_env(Some(repo_config_dir()), environment)
            .unwrap_or_else(|e| panic!("{environment}: {e}"));
        assert_eq!(manager.environment(), environment);

        let config = manager.config();
        assert_eq!(config.delay.seed, 42);
        assert_eq!(config.delay.rules, DelayRule::default_rules());
        assert_eq!(config.cycle.weather, WeatherCondition::Cerah);
        assert_eq!(config.production.default_target_production, 5000.0);
    }
}

#[test]
fn test_environment_file_overrides_base() {
    let production = ConfigManager::load_from_directory_with_env(Some(repo_config_dir()), "production").unwrap();
    assert_eq!(production.config().dispatch.tick_interval_ms, 10_000);
    assert!(production.config().logging.json);

    let test = ConfigManager::load_from_directory_with_env(Some(repo_config_dir()), "test").unwrap();
    assert_eq!(test.config().dispatch.tick_interval_ms, 100);
    assert_eq!(test.config().dispatch.real_time_factor, 0.0);
    // Untouched sections come from fleet.toml
    assert_eq!(test.config().queue.default_max_queue_size, 3);
}

#[test]
fn test_missing_sections_fall_back_to_defaults() {
    let dir = write_config(
        r#"
[dispatch]
max_dispatch_per_tick = 4

[cycle]
weather = "HUJAN_LEBAT"
"#,
        None,
    );

    let manager = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "staging").unwrap();
    let config = manager.config();
    assert_eq!(config.dispatch.max_dispatch_per_tick, 4);
    assert_eq!(config.dispatch.tick_interval_ms, FleetConfig::default().dispatch.tick_interval_ms);
    assert_eq!(config.cycle.weather, WeatherCondition::HujanLebat);
    assert_eq!(config.delay, FleetConfig::default().delay);
}

#[test]
fn test_custom_delay_rules_replace_defaults() {
    let dir = write_config(
        r#"
[delay]
seed = 7

[[delay.rules]]
phase = "HAULING"
category = "SAFETY"
probability = 0.1
min_minutes = 5
max_minutes = 15
"#,
        None,
    );

    let manager = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap();
    assert_eq!(manager.config().delay.seed, 7);
    assert_eq!(
        manager.config().delay.rules,
        vec![DelayRule::new(DelayPhase::Hauling, DelayCategory::Safety, 0.1, 5, 15)]
    );
}

#[test]
fn test_invalid_values_are_rejected() {
    let dir = write_config(
        "[cycle]\nload_factor_min = 0.9\nload_factor_max = 0.8\n",
        None,
    );
    let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap_err();
    assert!(matches!(err, ConfigurationError::InvalidValue { .. }));

    let dir = write_config(
        "[queue]\ndefault_max_queue_size = 3\n",
        Some(("test", "[[delay.rules]]\nphase = \"IN_QUEUE\"\ncategory = \"WEATHER\"\nprobability = 0.1\nmin_minutes = 10\nmax_minutes = 20\n")),
    );
    let err = ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test").unwrap_err();
    assert!(err.to_string().contains("delay.rules"));
}

#[test]
fn test_missing_directory_is_reported() {
    let err = ConfigManager::load_from_directory_with_env(Some(PathBuf::from("/nonexistent/haul/config")), "test")
        .unwrap_err();
    assert!(matches!(err, ConfigurationError::DirectoryNotFound { .. }));
}

#[test]
fn test_example_fleet_definition_builds() {
    let definition = FleetDefinition::from_json_file(&repo_config_dir().join("fleet_definition.example.json")).unwrap();
    assert_eq!(definition.trucks.len(), 4);
    assert_eq!(definition.trucks[2].average_speed, 28.0);
    assert_eq!(definition.excavators[0].status, ExcavatorStatus::Active);
    assert_eq!(definition.operators.iter().filter(|o| o.shift == Shift::Shift3).count(), 2);
    assert_eq!(definition.road_segments[2].road_condition, RoadCondition::Fair);

    let parts = definition.build(&QueueConfig::default());
    let catalog = parts.catalog.as_ref();
    // maxQueueSize 0 takes the configured default
    assert_eq!(catalog.loading_point("LP-02").unwrap().max_queue_size, 3);
    assert_eq!(catalog.shortest_road("LP-01", "DP-01").unwrap().id, "RD-01");
    assert!(catalog.shortest_road("LP-02", "DP-02").is_none());
    assert!(!catalog.delay_reasons().is_empty());
    assert_eq!(parts.stock.level("DP-01").unwrap().stock, 12_000.0);
    assert_eq!(parts.registry.idle_trucks().len(), 4);
}

#[test]
fn test_malformed_fleet_definition_is_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fleet.json");
    fs::write(&path, r#"{ "trucks": [ { "id": "TRK-01" } ] }"#).unwrap();

    let err = FleetDefinition::from_json_file(&path).unwrap_err();
    assert!(matches!(err, ConfigurationError::FleetDefinitionError { .. }));
}

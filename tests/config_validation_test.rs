//! Configuration validation tests
//!
//! Tests that verify configuration defaults, TOML layout and validation.

use nas_engine::config::{Config, MonitorConfig, ServerConfig};
use std::time::Duration;

fn parse(toml: &str) -> Config {
    config::Config::builder()
        .add_source(config::File::from_str(toml, config::FileFormat::Toml))
        .build()
        .expect("config builds")
        .try_deserialize()
        .expect("config deserializes")
}

#[test]
fn test_default_server_config() {
    // Given: Server defaults
    let config = ServerConfig::default();

    // Then: Bind to all interfaces on the exporter port
    assert_eq!(config.addr, "0.0.0.0");
    assert_eq!(config.port, 9110);
    assert_eq!(config.metrics_refresh_seconds, 15);
}

#[test]
fn test_monitor_defaults() {
    // Given: Monitor defaults
    let config = MonitorConfig::default();

    // Then: 30s ticks, 5 minute SMART rounds, 60°C threshold
    assert_eq!(config.base_interval(), Duration::from_secs(30));
    assert_eq!(config.smart_interval(), Duration::from_secs(300));
    assert_eq!(config.temperature_threshold_celsius, 60);
    assert_eq!(config.command_timeout(), Duration::from_secs(30));
    assert!(!config.include_loop_devices);
}

#[test]
fn test_smart_ttl_falls_back_to_interval() {
    let mut config = MonitorConfig::default();
    assert_eq!(config.smart_ttl(), Duration::from_secs(300));

    config.smart_ttl_seconds = Some(120);
    assert_eq!(config.smart_ttl(), Duration::from_secs(120));
}

#[test]
fn test_empty_document_uses_defaults() {
    // Given: An empty TOML document
    let config = parse("");

    // Then: Every section takes its defaults and passes validation
    assert_eq!(config.scheduler.tick_seconds, 60);
    assert_eq!(config.events.subscriber_capacity, 256);
    assert_eq!(config.events.retained_notifications, 10_000);
    assert_eq!(config.system.interval_seconds, 10);
    assert!(config.policies.is_empty());
    assert!(config.validate().is_ok());
}

#[test]
fn test_policies_are_deserialized() {
    // Given: Two seeded policies, one disabled
    let config = parse(
        r#"
        [monitor]
        base_interval_seconds = 10

        [[policies]]
        name = "daily"
        schedule = "@daily"
        retention = "7d"
        datasets = ["tank/data", "tank/media"]

        [[policies]]
        name = "hourly"
        schedule = "every 1h"
        retention = "keep 24"
        datasets = ["tank/vm"]
        enabled = false
        "#,
    );

    // Then: Both are present and "enabled" defaults to true
    assert_eq!(config.monitor.base_interval_seconds, 10);
    assert_eq!(config.policies.len(), 2);
    assert_eq!(config.policies[0].name, "daily");
    assert_eq!(config.policies[0].datasets, vec!["tank/data", "tank/media"]);
    assert!(config.policies[0].enabled);
    assert!(!config.policies[1].enabled);
}

#[test]
fn test_validate_rejects_zero_intervals() {
    let cases: [(&str, fn(&mut Config)); 6] = [
        ("base_interval_seconds", |c| c.monitor.base_interval_seconds = 0),
        ("command_timeout_seconds", |c| c.monitor.command_timeout_seconds = 0),
        ("tick_seconds", |c| c.scheduler.tick_seconds = 0),
        ("subscriber_capacity", |c| c.events.subscriber_capacity = 0),
        ("retained_notifications", |c| c.events.retained_notifications = 0),
        ("system.interval_seconds", |c| c.system.interval_seconds = 0),
    ];

    for (field, mutate) in cases {
        // Given: A config with one field zeroed
        let mut config = Config::default();
        mutate(&mut config);

        // When: Validating
        let error = config.validate().expect_err("zero should be rejected");

        // Then: The message names the field
        assert!(
            error.to_string().contains(field),
            "error for {field} was: {error}"
        );
    }
}

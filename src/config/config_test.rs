use serial_test::serial;
use temp_env::with_vars;

use super::*;

fn cleanup_all_espool_env_vars() {
    for (key, _) in std::env::vars() {
        if key.starts_with("ESPOOL__") || key == "ESPOOL_CONFIG" {
            std::env::remove_var(&key);
        }
    }
}

#[test]
#[serial]
fn default_config_should_initialize_with_hardcoded_values() {
    let settings = Settings::default();

    assert_eq!(settings.spool.spool_size, 1024);
    assert_eq!(settings.spool.spool_timeout_ms, 5_000);
    assert_eq!(settings.spool.intake_backlog, 16);
    assert!(!settings.monitoring.prometheus_enabled);
    assert_eq!(settings.monitoring.prometheus_port, 8080);
    assert_eq!(settings.log_dir.as_os_str().to_str(), Some("logs"));
}

#[test]
#[serial]
fn load_without_sources_should_match_defaults() {
    cleanup_all_espool_env_vars();
    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let settings = Settings::load(None).expect("defaults are valid");

        assert_eq!(settings.spool, SpoolConfig::default());
        assert_eq!(settings.monitoring, MonitoringConfig::default());
    });
}

#[test]
#[serial]
fn load_should_merge_environment_overrides() {
    cleanup_all_espool_env_vars();
    with_vars(
        vec![
            ("ESPOOL__SPOOL__SPOOL_SIZE", Some("3")),
            ("ESPOOL__MONITORING__PROMETHEUS_ENABLED", Some("true")),
        ],
        || {
            let settings = Settings::load(None).expect("success");

            assert_eq!(settings.spool.spool_size, 3);
            assert!(settings.monitoring.prometheus_enabled);
            // untouched fields keep their defaults
            assert_eq!(settings.spool.spool_timeout_ms, 5_000);
        },
    );
}

#[test]
#[serial]
fn load_should_merge_file_settings() {
    cleanup_all_espool_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("espool.toml");

    std::fs::write(
        &config_path,
        r#"
        log_dir = "/tmp/espool-logs"

        [spool]
        spool_size = 256
        spool_timeout_ms = 750

        [monitoring]
        prometheus_enabled = true
        prometheus_port = 9901
        "#,
    )
    .unwrap();

    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        let settings = Settings::load(config_path.to_str()).expect("success");

        assert_eq!(settings.spool.spool_size, 256);
        assert_eq!(settings.spool.spool_timeout_ms, 750);
        // missing fields fall back to defaults
        assert_eq!(settings.spool.intake_backlog, 16);
        assert_eq!(settings.monitoring.prometheus_port, 9901);
        assert_eq!(
            settings.log_dir.as_os_str().to_str(),
            Some("/tmp/espool-logs")
        );
    });
}

#[test]
#[serial]
fn environment_should_override_file_settings() {
    cleanup_all_espool_env_vars();
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("espool.toml");

    std::fs::write(
        &config_path,
        r#"
        [spool]
        spool_size = 256
        "#,
    )
    .unwrap();

    with_vars(vec![("ESPOOL__SPOOL__SPOOL_SIZE", Some("512"))], || {
        let settings = Settings::load(config_path.to_str()).expect("success");

        assert_eq!(settings.spool.spool_size, 512);
    });
}

#[test]
#[serial]
fn load_should_reject_invalid_merged_config() {
    cleanup_all_espool_env_vars();
    with_vars(vec![("ESPOOL__SPOOL__SPOOL_SIZE", Some("0"))], || {
        assert!(Settings::load(None).is_err());
    });
}

#[test]
#[serial]
fn load_should_fail_on_missing_file() {
    cleanup_all_espool_env_vars();
    let empty_vars: Vec<(&str, Option<&str>)> = vec![];
    with_vars(empty_vars, || {
        assert!(Settings::load(Some("/nonexistent/espool.toml")).is_err());
    });
}

use std::io::Write;

use cadence_core::CadenceConfig;

fn write_config(body: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .unwrap();
    file.write_all(body.as_bytes()).unwrap();
    file
}

#[test]
fn full_file_is_read() {
    let file = write_config(
        r#"
        [database]
        path = "/tmp/cadence-test.db"

        [scheduler]
        default_lookback = 48
        work_timeout_secs = 120

        [log]
        filter = "cadence_scheduler=debug"
        "#,
    );

    let config = CadenceConfig::load(file.path().to_str()).unwrap();
    assert_eq!(config.database.path, "/tmp/cadence-test.db");
    assert_eq!(config.scheduler.default_lookback, 48);
    assert_eq!(config.scheduler.work_timeout_secs, 120);
    assert_eq!(config.log.filter, "cadence_scheduler=debug");
}

#[test]
fn partial_sections_fall_back_to_defaults() {
    let file = write_config("[scheduler]\ndefault_lookback = 2\n");

    let config = CadenceConfig::load(file.path().to_str()).unwrap();
    assert_eq!(config.scheduler.default_lookback, 2);
    assert_eq!(config.scheduler.work_timeout_secs, 3600);
    assert!(config.database.path.ends_with("cadence.db"));
}

#[test]
fn malformed_values_are_config_errors() {
    let file = write_config("[scheduler]\ndefault_lookback = \"soon\"\n");

    let err = CadenceConfig::load(file.path().to_str()).unwrap_err();
    assert_eq!(err.code(), "CONFIG_ERROR");
}

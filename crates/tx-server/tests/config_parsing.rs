use std::{env, fs};

use tx_server::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("tx-server.toml");

    let toml_content = r#"
[server]
host = "127.0.0.1"
port = 8081
body_limit_bytes = 2097152
default_deadline_ms = 5000

[logging]
level = "debug"

[packages]
load = ["hl7.fhir.r4.core#4.0.1"]

[cache]
resource_max_age_secs = 1800
expansion_max_age_secs = 1800
expansion_min_duration_to_admit_ms = 500
expansion_capacity = 500

[i18n]
default_language = "en"
fallback_language = "en"
"#;
    fs::write(&path, toml_content).expect("write toml");

    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.server.port, 8081);
    assert_eq!(cfg.server.body_limit_bytes, 2_097_152);
    assert_eq!(cfg.logging.level.to_ascii_lowercase(), "debug");
    assert_eq!(cfg.packages.load, vec!["hl7.fhir.r4.core#4.0.1".to_string()]);
    assert_eq!(cfg.cache.expansion_capacity, 500);

    // Env override wins over the file.
    unsafe {
        env::set_var("TX__LOGGING__LEVEL", "trace");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.logging.level, "trace");
    unsafe {
        env::remove_var("TX__LOGGING__LEVEL");
    }

    // An invalid logging level is rejected at load time.
    let invalid_path = dir.path().join("invalid.toml");
    fs::write(&invalid_path, "[logging]\nlevel = \"verbose\"\n").expect("write invalid toml");
    let err = load_config(invalid_path.to_str()).expect_err("expected validation error");
    assert!(err.contains("logging.level"));
}

#[test]
fn missing_config_file_falls_back_to_defaults_plus_env() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let missing = dir.path().join("does-not-exist.toml");

    let cfg = load_config(missing.to_str()).expect("defaults should still validate");
    assert_eq!(cfg.server.port, 8080);
    assert_eq!(cfg.logging.level, "info");
}

//! Configuration tests
//!
//! Round-trip guards for the file template plus precedence checks for the
//! env > file > default layering.

use super::*;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| vars.get(key).cloned()
}

fn parse(toml_str: &str) -> FileConfig {
    toml::from_str(toml_str).unwrap()
}

// ─────────────────────────────────────────────────────────────────────────────
// Round-trip tests
// ─────────────────────────────────────────────────────────────────────────────

/// Verify that the default template can be parsed back
#[test]
fn test_config_roundtrip_default() {
    let config = Config::default();
    let toml_str = config.to_toml();

    let parsed: Result<FileConfig, _> = toml::from_str(&toml_str);
    assert!(
        parsed.is_ok(),
        "Default config should round-trip.\nTOML:\n{}\nError: {:?}",
        toml_str,
        parsed.err()
    );

    let resolved = Config::resolve(parsed.unwrap(), env(&[])).unwrap();
    assert_eq!(resolved.agent_url, DEFAULT_AGENT_URL);
    assert_eq!(resolved.scan, ScanConfig::default());
    assert_eq!(resolved.logging, LoggingConfig::default());
}

#[test]
fn test_config_roundtrip_custom() {
    let mut config = Config::default();
    config.agent_url = "ws://blepi.local:2021".to_string();
    config.scan.timeout_secs = Some(20);
    config.scan.tick_ms = 100;
    config.logging.level = "debug".to_string();
    config.logging.dir = Some(PathBuf::from("/var/log/blescope"));
    config.logging.rotation = LogRotation::Hourly;

    let resolved = Config::resolve(parse(&config.to_toml()), env(&[])).unwrap();
    assert_eq!(resolved.agent_url, "ws://blepi.local:2021");
    assert_eq!(resolved.scan.timeout_secs, Some(20));
    assert_eq!(resolved.scan.tick_ms, 100);
    assert_eq!(resolved.logging.level, "debug");
    assert_eq!(resolved.logging.dir, Some(PathBuf::from("/var/log/blescope")));
    assert_eq!(resolved.logging.rotation, LogRotation::Hourly);
    assert_eq!(resolved.logging.default_filter(), "blescope=debug");
}

// ─────────────────────────────────────────────────────────────────────────────
// Precedence
// ─────────────────────────────────────────────────────────────────────────────

#[test]
fn test_env_overrides_file() {
    let file = parse(
        r#"
agent_url = "ws://from-file:2021"

[scan]
timeout_secs = 5
"#,
    );
    let config = Config::resolve(
        file,
        env(&[
            ("BLESCOPE_URL", "ws://from-env:2021"),
            ("BLESCOPE_SCAN_TIMEOUT", "30"),
        ]),
    )
    .unwrap();

    assert_eq!(config.agent_url, "ws://from-env:2021");
    assert_eq!(config.scan.timeout(), Some(Duration::from_secs(30)));
}

#[test]
fn test_file_overrides_default() {
    let config = Config::resolve(parse(r#"agent_url = "ws://10.0.0.7:2021""#), env(&[])).unwrap();
    assert_eq!(config.agent_url, "ws://10.0.0.7:2021");
    assert_eq!(config.scan.timeout(), None);
    assert_eq!(config.scan.tick_interval(), Duration::from_millis(250));
}

#[test]
fn test_runtime_flags() {
    let config = Config::resolve(
        FileConfig::default(),
        env(&[("BLESCOPE_NO_TUI", "true"), ("BLESCOPE_DEMO", "1")]),
    )
    .unwrap();
    assert!(!config.enable_tui);
    assert!(config.demo_mode);

    let config = Config::resolve(
        FileConfig::default(),
        env(&[("BLESCOPE_NO_TUI", "0"), ("BLESCOPE_DEMO", "no")]),
    )
    .unwrap();
    assert!(config.enable_tui);
    assert!(!config.demo_mode);
}

#[test]
fn test_zero_timeout_means_unset() {
    let config = Config::resolve(parse("[scan]\ntimeout_secs = 0\ntick_ms = 0\n"), env(&[])).unwrap();
    assert_eq!(config.scan.timeout(), None);
    assert_eq!(config.scan.tick_ms, 250);
}

#[test]
fn test_bad_env_timeout_is_an_error() {
    let err = Config::resolve(
        FileConfig::default(),
        env(&[("BLESCOPE_SCAN_TIMEOUT", "soon")]),
    )
    .unwrap_err();
    assert!(err.to_string().contains("BLESCOPE_SCAN_TIMEOUT"));
}

#[test]
fn test_unparsable_file_is_an_error() {
    let dir = std::env::temp_dir().join(format!("blescope-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    std::fs::write(&path, "agent_url = ws://missing-quotes\n").unwrap();

    let err = Config::load_file(&path).unwrap_err();
    assert!(err.to_string().contains("Failed to parse"));

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_missing_file_yields_defaults() {
    let path = std::env::temp_dir().join("blescope-definitely-missing").join("config.toml");
    let file = Config::load_file(&path).unwrap();
    assert!(file.agent_url.is_none());
    assert!(file.scan.is_none());
}

#[test]
fn test_logging_section() {
    let config = Config::resolve(
        parse("[logging]\nlevel = \"trace\"\ndir = \"\"\nrotation = \"never\"\n"),
        env(&[]),
    )
    .unwrap();
    assert_eq!(config.logging.level, "trace");
    assert_eq!(config.logging.dir, None);
    assert_eq!(config.logging.rotation, LogRotation::Never);
}

#[test]
fn test_unknown_rotation_is_rejected() {
    let parsed: Result<FileConfig, _> = toml::from_str("[logging]\nrotation = \"weekly\"\n");
    assert!(parsed.is_err());
}

// tests/config_file.rs
use std::io::Write;

use market_news_monitor::config::{AppConfig, ENV_CONFIG_PATH};
use serial_test::serial;

#[test]
#[serial]
fn env_path_overrides_default_location() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        f,
        r#"
[scheduler]
fetch_interval_secs = 120
daily_summary_at = "17:30"

[notify]
min_importance = 5
"#
    )
    .unwrap();

    std::env::set_var(ENV_CONFIG_PATH, f.path());
    let cfg = AppConfig::load_default();
    std::env::remove_var(ENV_CONFIG_PATH);

    let cfg = cfg.unwrap();
    assert_eq!(cfg.scheduler.fetch_interval_secs, 120);
    assert_eq!(cfg.scheduler.daily_summary_at, "17:30");
    assert_eq!(cfg.notify.min_importance, 5);
    assert_eq!(cfg.analysis.batch_limit, 50);
}

#[test]
#[serial]
fn missing_env_path_is_an_error() {
    std::env::set_var(ENV_CONFIG_PATH, "/definitely/not/here/monitor.toml");
    let res = AppConfig::load_default();
    std::env::remove_var(ENV_CONFIG_PATH);
    assert!(res.is_err());
}

#[test]
#[serial]
fn invalid_values_are_rejected_with_context() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    writeln!(f, "[notify]\nmin_importance = 9").unwrap();

    let err = AppConfig::load_from(f.path()).unwrap_err();
    assert!(format!("{err:#}").contains("min_importance"));
}

#[test]
#[serial]
fn shipped_sample_config_loads() {
    let cfg = AppConfig::load_from(std::path::Path::new("config/monitor.toml")).unwrap();
    assert_eq!(cfg.scheduler.utc_offset_hours, 8);
    assert_eq!(cfg.inference.provider(), "openai");
    assert!(cfg.notify.email.is_none());
}

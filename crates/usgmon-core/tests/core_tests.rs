use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use usgmon_core::{
    Config, ConfigError, FsIdentity, LogFormat, MonitoredPath, ScanStatus, StrategyKind,
};

const SAMPLE: &str = r#"
[database]
path = "/tmp/usgmon-test.db"

[logging]
level = "debug"
format = "json"

[scan]
interval = "30m"
workers = 8
strategy = "walk"
batch_size = 50

[[paths]]
path = "/www/users"
depth = 1
interval = "6h"
follow_symlinks = true
exclude = ["*.tmp", "cache"]

[[paths]]
path = "/srv/projects"
"#;

fn write_config(contents: &str) -> (TempDir, PathBuf) {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("usgmon.toml");
    std::fs::write(&path, contents).unwrap();
    (temp, path)
}

#[test]
fn test_load_full_config() {
    let (_temp, path) = write_config(SAMPLE);
    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.database.path, PathBuf::from("/tmp/usgmon-test.db"));
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(config.scan.interval, Duration::from_secs(1800));
    assert_eq!(config.scan.workers, 8);
    assert_eq!(config.scan.strategy, StrategyKind::Walk);
    assert_eq!(config.scan.batch_size, 50);

    assert_eq!(config.paths.len(), 2);
    let users = &config.paths[0];
    assert_eq!(users.path, PathBuf::from("/www/users"));
    assert_eq!(users.depth, 1);
    assert_eq!(users.interval, Some(Duration::from_secs(6 * 3600)));
    assert!(users.follow_symlinks);
    assert_eq!(users.exclude, vec!["*.tmp".to_string(), "cache".to_string()]);

    let projects = &config.paths[1];
    assert_eq!(projects.depth, 0);
    assert_eq!(projects.interval, None);
    assert!(!projects.follow_symlinks);
    assert_eq!(
        projects.effective_interval(config.scan.interval),
        Duration::from_secs(1800)
    );
}

#[test]
fn test_missing_sections_use_defaults() {
    let (_temp, path) = write_config("[[paths]]\npath = \"/data\"\ndepth = 2\n");
    let config = Config::load(Some(&path)).unwrap();

    assert_eq!(config.scan, Default::default());
    assert_eq!(config.logging.format, LogFormat::Text);
    assert_eq!(config.paths, vec![MonitoredPath::new("/data", 2)]);
}

#[test]
fn test_explicit_missing_file_is_an_error() {
    let temp = TempDir::new().unwrap();
    let err = Config::load(Some(&temp.path().join("nope.toml"))).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_parse_errors_are_reported() {
    let (_temp, path) = write_config("[scan]\ninterval = \"often\"\n");
    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));

    let (_temp, path) = write_config("[[paths]]\ndepth = 1\n");
    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
}

#[test]
fn test_validation_runs_on_load() {
    let (_temp, path) = write_config("[scan]\nworkers = 0\n");
    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "scan.workers"));

    let (_temp, path) = write_config("[[paths]]\npath = \"/a\"\ninterval = \"0s\"\n");
    let err = Config::load(Some(&path)).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { ref field, .. } if field == "paths[0].interval"));
}

#[test]
fn test_config_serializes_back_to_toml() {
    let (_temp, path) = write_config(SAMPLE);
    let config = Config::load(Some(&path)).unwrap();

    let text = toml::to_string(&config).unwrap();
    let reparsed: Config = toml::from_str(&text).unwrap();
    assert_eq!(reparsed, config);
}

#[test]
fn test_identity_distinguishes_directories() {
    let temp = TempDir::new().unwrap();
    std::fs::create_dir(temp.path().join("a")).unwrap();
    std::fs::create_dir(temp.path().join("b")).unwrap();

    let a = FsIdentity::of(&temp.path().join("a")).unwrap();
    let b = FsIdentity::of(&temp.path().join("b")).unwrap();
    assert_ne!(a, b);
    assert_eq!(a.device, b.device);
}

#[test]
fn test_scan_status_display() {
    assert_eq!(ScanStatus::Running.to_string(), "running");
    assert_eq!(
        ScanStatus::Failed(ScanStatus::CANCELLED.to_string()).to_string(),
        "failed: cancelled"
    );
}

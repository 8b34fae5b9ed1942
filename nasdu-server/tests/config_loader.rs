use std::{fs, path::PathBuf};

use anyhow::Result;
use tempfile::TempDir;

use nasdu_core::ScanSlug;
use nasdu_core::model::ScanMode;
use nasdu_core::paths::RemotePath;
use nasdu_server::infra::config::{ConfigLoadError, ConfigLoader, ScanEntryError};

fn write_config(dir: &TempDir, contents: &str) -> Result<PathBuf> {
    let path = dir.path().join("nasdu.toml");
    fs::write(&path, contents)?;
    Ok(path)
}

fn load(path: PathBuf) -> Result<nasdu_server::infra::config::ConfigLoad, ConfigLoadError> {
    ConfigLoader::new().with_config_path(path).ignore_env().load()
}

#[test]
fn missing_explicit_config_is_an_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = load(dir.path().join("absent.toml")).expect_err("missing file");
    assert!(matches!(err, ConfigLoadError::MissingConfig { .. }));
}

#[test]
fn malformed_toml_reports_the_path() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(&dir, "[server\nport = 1")?;

    let err = load(path.clone()).expect_err("parse error");
    match err {
        ConfigLoadError::Parse { path: reported, .. } => assert_eq!(reported, path),
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn empty_file_falls_back_to_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(&dir, "")?;

    let load = load(path.clone())?;
    let config = load.config;
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8080);
    assert_eq!(config.storage.history_path, PathBuf::from("data/history.json"));
    assert!(config.mount.root.is_none());
    assert_eq!(config.runner.max_parallel_paths, 4);
    assert_eq!(config.metadata.config_path, Some(path));
    assert!(!config.metadata.env_file_loaded);
    assert_eq!(load.warnings.len(), 1);
    Ok(())
}

#[test]
fn scan_entries_expand_into_definitions() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(
        &dir,
        r#"
[server]
port = 9090

[runner]
min_poll_interval_ms = 250

[[scans]]
name = "Home Folders"
shares = ["homes"]
folders = ["alice", "bob"]
mode = "sequential"

[[scans]]
name = "Media"
slug = "media-all"
shares = ["video", "music"]
paths = ["/photo/2024/"]

[[scans]]
name = "Home Folders"
paths = ["/homes/carol"]
enabled = false
"#,
    )?;

    let load = load(path)?;
    let config = load.config;
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.runner.min_poll_interval_ms, 250);
    assert_eq!(config.runner.max_poll_interval_ms, 10_000);
    assert_eq!(config.scans.len(), 3);

    let homes = &config.scans[0];
    assert_eq!(homes.slug.as_str(), "home-folders");
    assert_eq!(homes.mode, ScanMode::Sequential);
    assert_eq!(
        homes.paths,
        vec![RemotePath::new("/homes/alice"), RemotePath::new("/homes/bob")]
    );

    let media = config
        .scan(&ScanSlug::parse("media-all")?)
        .expect("explicit slug");
    assert_eq!(
        media.paths,
        vec![
            RemotePath::new("/photo/2024"),
            RemotePath::new("/video"),
            RemotePath::new("/music"),
        ]
    );

    let duplicate = &config.scans[2];
    assert_ne!(duplicate.slug, homes.slug);
    assert!(!duplicate.enabled);
    assert!(!load.warnings.is_empty());
    Ok(())
}

#[test]
fn invalid_scan_entries_are_rejected() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(
        &dir,
        r#"
[[scans]]
name = "Broken"
shares = ["a", "b"]
folders = ["x"]
"#,
    )?;

    let err = load(path).expect_err("two shares with folders");
    match err {
        ConfigLoadError::Scan(ScanEntryError::FoldersNeedOneShare { count, .. }) => {
            assert_eq!(count, 2)
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[test]
fn missing_mount_root_is_a_warning() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let path = write_config(
        &dir,
        r#"
[mount]
root = "/definitely/not/here"

[[scans]]
name = "Homes"
shares = ["homes"]
"#,
    )?;

    let load = load(path)?;
    assert_eq!(
        load.config.mount.root,
        Some(PathBuf::from("/definitely/not/here"))
    );
    assert!(
        load.warnings
            .items
            .iter()
            .any(|warning| warning.message.contains("mount root"))
    );
    Ok(())
}

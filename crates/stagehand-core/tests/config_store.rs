use std::path::Path;

use stagehand_core::config::{ConfigStore, StagehandConfig};
use stagehand_core::types::Component;
use tempfile::TempDir;

#[test]
fn missing_file_yields_defaults() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path().join("config"));
    assert_eq!(store.load().unwrap(), StagehandConfig::default());
}

#[test]
fn save_then_load_preserves_changes() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path().to_path_buf());

    let mut config = StagehandConfig::default();
    config.datastore.port = 6543;
    config.health.retries = 7;
    config
        .services
        .get_mut(Component::AuxiliaryA.as_str())
        .unwrap()
        .start = Some("docker start aux-a".to_string());
    store.save(&config).unwrap();

    let loaded = store.load().unwrap();
    assert_eq!(loaded, config);
    assert_eq!(
        loaded.service(Component::AuxiliaryA).start.as_deref(),
        Some("docker start aux-a")
    );
}

#[test]
fn partial_file_fills_in_defaults() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path().to_path_buf());
    std::fs::write(store.config_path(), "[health]\nretries = 0\n").unwrap();

    let config = store.load().unwrap();
    assert_eq!(config.health.retries, 0);
    assert_eq!(config.datastore.port, 5432);
    assert_eq!(config.service(Component::Workspace).port, 8881);
}

#[test]
fn active_workspace_is_remembered() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path().to_path_buf());

    store.set_active_workspace(Path::new("/srv/ws")).unwrap();
    store.set_active_workspace(Path::new("/srv/ws")).unwrap();
    assert_eq!(
        store.load().unwrap().workspace.active_path.as_deref(),
        Some(Path::new("/srv/ws"))
    );
}

#[test]
fn parse_errors_point_at_the_line() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path().to_path_buf());
    std::fs::write(
        store.config_path(),
        "[datastore]\nhost = \"db\"\nport = \"not a number\"\n",
    )
    .unwrap();

    let err = store.load().unwrap_err();
    let message = format!("{err:#}");
    assert!(message.contains("line 3"), "{message}");
    assert!(message.contains("Failed to parse config file"), "{message}");
}

#[test]
fn invalid_values_are_rejected_on_load() {
    let temp = TempDir::new().unwrap();
    let store = ConfigStore::from_dir(temp.path().to_path_buf());
    std::fs::write(store.config_path(), "[services.agent]\nport = 1\n").unwrap();
    assert!(store.load().is_err());
}

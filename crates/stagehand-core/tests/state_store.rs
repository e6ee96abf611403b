use stagehand_core::error::{InputValidationError, ResumptionError};
use stagehand_core::state::{STATE_FILE_NAME, StateStore, WorkflowState};
use stagehand_core::types::{Component, WorkflowStep};
use stagehand_core::workflow::WorkflowOptions;
use tempfile::TempDir;

#[test]
fn save_leaves_only_the_state_file() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("state"));

    let mut state = WorkflowState::new(Component::All, WorkflowOptions::default());
    for step in [
        WorkflowStep::ValidatingInput,
        WorkflowStep::InstallingComponents,
    ] {
        state.begin(step);
        state.complete(step);
        store.save(&state).unwrap();
    }

    let entries: Vec<String> = std::fs::read_dir(store.state_dir())
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries, vec![STATE_FILE_NAME.to_string()]);

    let loaded = store.load().unwrap().unwrap();
    assert_eq!(loaded, state);
}

#[test]
fn missing_state_is_not_an_error() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path());
    assert!(!store.exists());
    assert_eq!(store.load().unwrap(), None);
    assert!(!store.clear().unwrap());
}

#[test]
fn garbage_state_is_reported_as_corrupted() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path());
    std::fs::write(store.path(), "{ not json").unwrap();

    match store.load() {
        Err(ResumptionError::Corrupted { path, .. }) => assert_eq!(path, store.path()),
        other => panic!("expected corruption, got {other:?}"),
    }
    assert!(store.clear().unwrap());
    assert!(!store.exists());
}

#[test]
fn state_dir_that_is_a_file_is_unwritable() {
    let temp = TempDir::new().unwrap();
    let blocker = temp.path().join("state");
    std::fs::write(&blocker, "").unwrap();

    let store = StateStore::new(&blocker);
    assert!(matches!(
        store.check_writable(),
        Err(InputValidationError::StateDirUnwritable { path, .. }) if path == blocker
    ));
}

#[test]
fn check_writable_creates_the_directory_and_cleans_up() {
    let temp = TempDir::new().unwrap();
    let store = StateStore::new(temp.path().join("nested").join("state"));
    store.check_writable().unwrap();
    assert!(store.state_dir().is_dir());
    assert_eq!(std::fs::read_dir(store.state_dir()).unwrap().count(), 0);
}

#[test]
fn completed_and_failed_never_overlap() {
    let mut state = WorkflowState::new(Component::Workspace, WorkflowOptions::default());
    let step = WorkflowStep::StartingServices;

    state.begin(step);
    state.fail(step);
    assert_eq!(state.failed_steps(), &[step]);

    state.begin(step);
    assert!(state.failed_steps().is_empty());
    state.complete(step);
    state.fail(step);
    assert!(!state.is_completed(step));
    assert_eq!(state.failed_steps(), &[step]);

    for s in state.completed_steps() {
        assert!(!state.failed_steps().contains(s));
    }
}

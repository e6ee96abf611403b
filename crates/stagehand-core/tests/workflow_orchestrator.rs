mod support;

use stagehand_core::error::{InputValidationError, ResumptionError, WorkflowError};
use stagehand_core::prompt::ScriptedPrompter;
use stagehand_core::state::WorkflowState;
use stagehand_core::types::{Component, HealthStatus, WorkflowStep};
use stagehand_core::workflow::{Interrupt, WorkflowOptions, WorkflowOrchestrator};
use stagehand_core::workspace::WORKSPACE_FILE;
use support::{TestEnv, fast_config};

use WorkflowStep::*;

fn orchestrator<'a>(env: &'a TestEnv, answers: &[&str]) -> WorkflowOrchestrator<'a> {
    WorkflowOrchestrator::new(
        &env.context,
        fast_config(),
        env.collaborators(),
        Box::new(ScriptedPrompter::new(answers.iter().copied())),
    )
}

fn assert_disjoint(state: &WorkflowState) {
    for step in state.completed_steps() {
        assert!(
            !state.failed_steps().contains(step),
            "{step} is both completed and failed"
        );
    }
}

#[test]
fn workspace_component_ends_with_a_new_workspace() {
    let env = TestEnv::new();
    let result = orchestrator(&env, &[]).run(Component::Workspace, WorkflowOptions::default());

    assert!(result.success, "{:?}", result.errors);
    assert_eq!(result.exit_code(), 0);
    assert_eq!(
        result.steps_completed,
        vec![
            ValidatingInput,
            InstallingComponents,
            StartingServices,
            PerformingHealthCheck,
            WorkspaceSelection
        ]
    );
    assert!(result.workspace_created);
    assert!(env.base_dir().join(WORKSPACE_FILE).is_file());
    assert!(env.data_dir().join("workspace").join("service.toml").is_file());
    assert_eq!(
        result.health.map(|h| h.overall),
        Some(HealthStatus::Healthy)
    );

    // Success leaves nothing to resume and remembers the workspace.
    assert!(!env.context.state_store().exists());
    assert_eq!(
        env.context.config_store().load().unwrap().workspace.active_path,
        Some(env.base_dir())
    );
}

#[test]
fn auxiliary_component_has_no_workspace_step() {
    let env = TestEnv::new();
    let result = orchestrator(&env, &[]).run(Component::AuxiliaryB, WorkflowOptions::default());

    assert!(result.success);
    assert!(!result.steps_completed.contains(&WorkspaceSelection));
    assert!(!result.workspace_created);
    assert!(result.workspace.is_none());
    assert!(!env.base_dir().join(WORKSPACE_FILE).exists());
}

#[test]
fn skipping_health_and_workspace_shortens_the_plan() {
    let env = TestEnv::new();
    env.world.take_down(5432);
    let options = WorkflowOptions {
        skip_health: true,
        skip_workspace: true,
        ..WorkflowOptions::default()
    };
    let result = orchestrator(&env, &[]).run(Component::Workspace, options);

    assert!(result.success);
    assert_eq!(
        result.steps_completed,
        vec![ValidatingInput, InstallingComponents, StartingServices]
    );
    assert!(result.health.is_none());
}

#[test]
fn full_deployment_prompts_for_the_workspace() {
    let env = TestEnv::new();
    let orchestrator = orchestrator(&env, &["1", "team"]);
    let result = orchestrator.run(Component::All, WorkflowOptions::default());

    assert!(result.success, "{:?}", result.errors);
    assert!(result.workspace_created);
    assert!(env.base_dir().join("team").join(WORKSPACE_FILE).is_file());
    for member in Component::All.members() {
        assert!(env.data_dir().join(member.as_str()).is_dir());
    }
}

#[test]
fn full_deployment_with_yes_does_not_prompt() {
    let env = TestEnv::new();
    let options = WorkflowOptions {
        auto_yes: true,
        ..WorkflowOptions::default()
    };
    // An empty script would fail the run if anything prompted.
    let result = orchestrator(&env, &[]).run(Component::All, options);
    assert!(result.success, "{:?}", result.errors);
    assert!(result.workspace_created);
}

#[test]
fn unreachable_datastore_fails_the_health_step() {
    let env = TestEnv::new();
    env.world.take_down(5432);
    let orchestrator = orchestrator(&env, &[]);
    let result = orchestrator.run(Component::Workspace, WorkflowOptions::default());

    assert!(!result.success);
    assert_eq!(result.exit_code(), 1);
    let err = &result.errors[0];
    assert!(matches!(err, WorkflowError::HealthCheck(_)));
    assert_eq!(err.health_status(), Some(HealthStatus::Unhealthy));
    assert!(
        err.suggestions()
            .iter()
            .any(|s| s.contains("Datastore at 127.0.0.1:5432"))
    );

    // Health failures do not undo installed and started services.
    let state = orchestrator.pending_state().unwrap().unwrap();
    assert_eq!(state.current_step, PerformingHealthCheck);
    assert_eq!(state.failed_steps(), &[PerformingHealthCheck]);
    assert!(state.is_completed(StartingServices));
    assert_disjoint(&state);
    assert!(env.data_dir().join("workspace").is_dir());
}

#[test]
fn degraded_health_does_not_stop_the_run() {
    let env = TestEnv::new();
    env.world.http_status.set(Some(404));
    let result = orchestrator(&env, &[]).run(Component::AuxiliaryA, WorkflowOptions::default());

    assert!(result.success);
    assert_eq!(
        result.health.map(|h| h.overall),
        Some(HealthStatus::Degraded)
    );
}

#[test]
fn refused_start_rolls_back_the_install() {
    let env = TestEnv::new();
    env.world.refuse_start.set(true);
    let orchestrator = orchestrator(&env, &[]);
    let result = orchestrator.run(Component::Workspace, WorkflowOptions::default());

    assert!(!result.success);
    let WorkflowError::Installation(err) = &result.errors[0] else {
        panic!("expected an installation error, got {:?}", result.errors);
    };
    assert_eq!(err.step, StartingServices);
    assert_eq!(err.operation, "start workspace");
    assert_eq!(
        err.rollback.rolled_back,
        vec![
            "render workspace service config".to_string(),
            "create workspace install directory".to_string()
        ]
    );
    assert!(!env.data_dir().join("workspace").exists());

    let state = orchestrator.pending_state().unwrap().unwrap();
    assert_eq!(state.completed_steps(), &[ValidatingInput]);
    assert_eq!(state.failed_steps(), &[StartingServices]);
    assert!(state.rollback_data.is_empty());
    assert_disjoint(&state);
}

#[test]
fn install_keeps_preexisting_service_config_on_rollback() {
    let env = TestEnv::new();
    let dir = env.data_dir().join("workspace");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("service.toml"), "# hand edited\n").unwrap();
    env.world.refuse_start.set(true);

    let result = orchestrator(&env, &[]).run(Component::Workspace, WorkflowOptions::default());
    assert!(!result.success);
    assert_eq!(
        std::fs::read_to_string(dir.join("service.toml")).unwrap(),
        "# hand edited\n"
    );
}

#[test]
fn interrupt_persists_the_current_step_and_resume_finishes() {
    let env = TestEnv::new();
    let interrupt = Interrupt::new();
    *env.world.interrupt_on_start.borrow_mut() = Some(interrupt.clone());

    let first = orchestrator(&env, &[]).with_interrupt(interrupt);
    let result = first.run(Component::Workspace, WorkflowOptions::default());
    assert!(result.interrupted);
    assert_eq!(result.exit_code(), 130);

    let state = first.pending_state().unwrap().unwrap();
    assert_eq!(state.current_step, StartingServices);
    assert_eq!(
        state.completed_steps(),
        &[ValidatingInput, InstallingComponents]
    );
    assert!(state.failed_steps().is_empty());
    assert!(state.rollback_data.contains_key("InstallingComponents"));
    // Interrupted work is kept for the resume.
    assert!(env.data_dir().join("workspace").is_dir());

    env.world.interrupt_on_start.borrow_mut().take();
    env.world.calls.borrow_mut().clear();
    let resumed = orchestrator(&env, &[]).resume().unwrap();
    assert!(resumed.success, "{:?}", resumed.errors);
    assert_eq!(
        resumed.steps_completed,
        vec![
            ValidatingInput,
            InstallingComponents,
            StartingServices,
            PerformingHealthCheck,
            WorkspaceSelection
        ]
    );
    assert_eq!(env.world.calls(), vec!["start workspace".to_string()]);
    assert!(!env.context.state_store().exists());
}

#[test]
fn resume_reapplies_the_original_options() {
    let env = TestEnv::new();
    let interrupt = Interrupt::new();
    *env.world.interrupt_on_start.borrow_mut() = Some(interrupt.clone());
    let options = WorkflowOptions {
        skip_workspace: true,
        ..WorkflowOptions::default()
    };
    orchestrator(&env, &[])
        .with_interrupt(interrupt)
        .run(Component::Workspace, options.clone());

    env.world.interrupt_on_start.borrow_mut().take();
    let orchestrator = orchestrator(&env, &[]);
    assert_eq!(orchestrator.pending_state().unwrap().unwrap().options, options);
    let resumed = orchestrator.resume().unwrap();
    assert!(resumed.success);
    assert!(!resumed.steps_completed.contains(&WorkspaceSelection));
}

#[test]
fn nothing_to_resume_after_success() {
    let env = TestEnv::new();
    let orchestrator = orchestrator(&env, &[]);
    assert!(
        orchestrator
            .run(Component::AuxiliaryB, WorkflowOptions::default())
            .success
    );
    assert_eq!(
        orchestrator.resume().unwrap_err(),
        ResumptionError::NoInterruptedInstallation
    );
}

#[test]
fn rejected_input_leaves_no_state() {
    let env = TestEnv::new();
    let file = env.base_dir().join("plain.txt");
    std::fs::write(&file, "").unwrap();
    let options = WorkflowOptions {
        workspace_path: Some(file.clone()),
        ..WorkflowOptions::default()
    };
    let orchestrator = orchestrator(&env, &[]);
    let result = orchestrator.run(Component::Workspace, options);

    assert!(!result.success);
    assert!(matches!(
        &result.errors[0],
        WorkflowError::InputValidation(InputValidationError::PathIsFile(path)) if *path == file
    ));
    assert!(result.steps_completed.is_empty());
    assert!(!orchestrator.state_store().exists());
    assert!(env.world.calls().is_empty());
}

#[test]
fn discard_removes_pending_state() {
    let env = TestEnv::new();
    env.world.refuse_start.set(true);
    let orchestrator = orchestrator(&env, &[]);
    orchestrator.run(Component::AuxiliaryA, WorkflowOptions::default());

    assert!(orchestrator.discard().unwrap());
    assert!(!orchestrator.discard().unwrap());
    assert_eq!(orchestrator.pending_state().unwrap(), None);
}

#[test]
fn failed_run_can_be_resumed_after_the_cause_is_fixed() {
    let env = TestEnv::new();
    env.world.take_down(5432);
    let failed = orchestrator(&env, &[]).run(Component::AuxiliaryA, WorkflowOptions::default());
    assert!(!failed.success);

    env.world.down_ports.borrow_mut().clear();
    let resumed = orchestrator(&env, &[]).resume().unwrap();
    assert!(resumed.success, "{:?}", resumed.errors);
    assert!(resumed.steps_completed.contains(&PerformingHealthCheck));
}

#[test]
fn start_failing_under_interrupt_keeps_the_install() {
    let env = TestEnv::new();
    let interrupt = Interrupt::new();
    *env.world.interrupt_on_start.borrow_mut() = Some(interrupt.clone());
    env.world.refuse_start.set(true);

    let orchestrator = orchestrator(&env, &[]).with_interrupt(interrupt);
    let result = orchestrator.run(Component::Workspace, WorkflowOptions::default());

    assert!(result.interrupted);
    assert_eq!(result.exit_code(), 130);
    assert!(result.errors.is_empty());
    let state = orchestrator.pending_state().unwrap().unwrap();
    assert_eq!(state.current_step, StartingServices);
    assert_eq!(
        state.completed_steps(),
        &[ValidatingInput, InstallingComponents]
    );
    assert!(state.failed_steps().is_empty());
    assert!(env.data_dir().join("workspace").join("service.toml").is_file());
    assert_eq!(env.world.calls(), vec!["start workspace".to_string()]);
}

#[test]
fn failed_resume_undoes_the_earlier_install() {
    let env = TestEnv::new();
    let interrupt = Interrupt::new();
    *env.world.interrupt_on_start.borrow_mut() = Some(interrupt.clone());
    let first = orchestrator(&env, &[])
        .with_interrupt(interrupt)
        .run(Component::Workspace, WorkflowOptions::default());
    assert!(first.interrupted);
    assert!(env.data_dir().join("workspace").is_dir());

    env.world.interrupt_on_start.borrow_mut().take();
    env.world.refuse_start.set(true);
    let orchestrator = orchestrator(&env, &[]);
    let resumed = orchestrator.resume().unwrap();

    assert!(!resumed.success);
    let WorkflowError::Installation(err) = &resumed.errors[0] else {
        panic!("expected an installation error, got {:?}", resumed.errors);
    };
    assert_eq!(err.operation, "start workspace");
    assert_eq!(
        err.rollback.rolled_back,
        vec![
            "render workspace service config".to_string(),
            "create workspace install directory".to_string()
        ]
    );
    assert!(!env.data_dir().join("workspace").exists());

    let state = orchestrator.pending_state().unwrap().unwrap();
    assert_eq!(state.completed_steps(), &[ValidatingInput]);
    assert_eq!(state.failed_steps(), &[StartingServices]);
    assert!(state.rollback_data.is_empty());
    assert_disjoint(&state);
}

#[test]
fn failed_resume_restores_a_preexisting_service_config() {
    let env = TestEnv::new();
    let dir = env.data_dir().join("workspace");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("service.toml"), "# hand edited\n").unwrap();

    let interrupt = Interrupt::new();
    *env.world.interrupt_on_start.borrow_mut() = Some(interrupt.clone());
    orchestrator(&env, &[])
        .with_interrupt(interrupt)
        .run(Component::Workspace, WorkflowOptions::default());
    assert_ne!(
        std::fs::read_to_string(dir.join("service.toml")).unwrap(),
        "# hand edited\n"
    );

    env.world.interrupt_on_start.borrow_mut().take();
    env.world.refuse_start.set(true);
    let resumed = orchestrator(&env, &[]).resume().unwrap();

    assert!(!resumed.success);
    assert!(dir.is_dir());
    assert_eq!(
        std::fs::read_to_string(dir.join("service.toml")).unwrap(),
        "# hand edited\n"
    );
}

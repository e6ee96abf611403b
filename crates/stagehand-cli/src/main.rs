//! Stagehand - install, start, health-check and set up a workspace
//!
//! Usage:
//!   stagehand install [COMPONENT]   # Run the full pipeline (default: all)
//!   stagehand resume                # Continue an interrupted installation
//!   stagehand health [COMPONENT]    # Check and report service health
//!   stagehand workspace ...         # Validate, create or inspect a workspace
//!   stagehand status | reset        # Inspect or discard saved progress

mod report;
mod terminal;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::{Confirm, theme::ColorfulTheme};
use tracing::{debug, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use stagehand_core::config::StagehandConfig;
use stagehand_core::context::AppContext;
use stagehand_core::error::{WorkflowError, WorkspaceError};
use stagehand_core::health::SystemProbe;
use stagehand_core::services::{CommandServiceManager, ConfigSecretsProvider, PlaceholderRenderer};
use stagehand_core::types::Component;
use stagehand_core::workflow::{Collaborators, Interrupt, WorkflowOptions, WorkflowOrchestrator};
use stagehand_core::workspace::WorkspaceManager;

use crate::report::OutputFormat;
use crate::terminal::{TerminalPrompter, print_step};

#[derive(Parser)]
#[command(name = "stagehand")]
#[command(about = "Install, start and health-check services, then set up a workspace", long_about = None)]
#[command(version)]
struct Cli {
    /// Output format
    #[arg(short, long, global = true, default_value = "table")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and start a component, check its health and set up a workspace
    Install(InstallArgs),

    /// Continue an interrupted or failed installation
    Resume,

    /// Check the health of a component
    Health {
        /// Component to check (all, workspace, auxiliary-a, auxiliary-b)
        #[arg(default_value = "all")]
        component: Component,

        /// Time budget per facet, in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Extra attempts per unhealthy facet
        #[arg(long)]
        retries: Option<u32>,
    },

    /// Manage workspaces
    Workspace(WorkspaceArgs),

    /// Show the saved progress of an unfinished installation
    Status,

    /// Discard the saved progress of an unfinished installation
    Reset {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[derive(Args)]
struct InstallArgs {
    /// Component to install (all, workspace, auxiliary-a, auxiliary-b)
    #[arg(default_value = "all")]
    component: Component,

    /// Skip the health check step
    #[arg(long)]
    skip_health: bool,

    /// Skip workspace setup
    #[arg(long)]
    skip_workspace: bool,

    /// Accept defaults without prompting; allows converting an existing directory
    #[arg(short, long)]
    yes: bool,

    /// Workspace directory to use or create
    #[arg(long, value_name = "PATH")]
    workspace: Option<PathBuf>,
}

impl InstallArgs {
    fn options(&self) -> WorkflowOptions {
        WorkflowOptions {
            skip_health: self.skip_health,
            skip_workspace: self.skip_workspace,
            auto_yes: self.yes,
            workspace_path: self.workspace.clone(),
        }
    }
}

#[derive(Args)]
struct WorkspaceArgs {
    #[command(subcommand)]
    command: WorkspaceCommand,
}

#[derive(Subcommand)]
enum WorkspaceCommand {
    /// Check whether a directory is a complete workspace
    Validate {
        /// Directory to check (default: current directory)
        path: Option<PathBuf>,
    },

    /// Create a new workspace
    Init {
        /// Name or path of the workspace (default: current directory)
        name: Option<String>,
    },

    /// List dependencies a workspace declares but this machine lacks
    Deps {
        /// Workspace directory (default: current directory)
        path: Option<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagehand=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let context = AppContext::with_default_dirs(cwd)?;
    let config = context
        .config_store()
        .load()
        .context("Failed to load stagehand.toml")?;

    run(cli, &context, config)
}

/// Everything the commands need, built once per invocation.
struct Runtime {
    services: CommandServiceManager,
    secrets: ConfigSecretsProvider,
    renderer: PlaceholderRenderer,
    probe: SystemProbe,
    interrupt: Interrupt,
}

impl Runtime {
    fn new(config: &StagehandConfig) -> Self {
        Self {
            services: CommandServiceManager::new(config.clone()),
            secrets: ConfigSecretsProvider::from_env(config.datastore.clone()),
            renderer: PlaceholderRenderer::new(),
            probe: SystemProbe::new(),
            interrupt: Interrupt::new(),
        }
    }

    fn collaborators(&self) -> Collaborators<'_> {
        Collaborators {
            services: &self.services,
            secrets: &self.secrets,
            renderer: &self.renderer,
            probe: &self.probe,
        }
    }

    fn orchestrator(&self, context: &AppContext, config: StagehandConfig) -> WorkflowOrchestrator<'_> {
        WorkflowOrchestrator::new(
            context,
            config,
            self.collaborators(),
            Box::new(TerminalPrompter::new(self.interrupt.clone())),
        )
        .with_interrupt(self.interrupt.clone())
    }
}

fn run(cli: Cli, context: &AppContext, config: StagehandConfig) -> Result<ExitCode> {
    let format = cli.format;
    let runtime = Runtime::new(&config);

    match cli.command {
        Commands::Install(args) => {
            spawn_interrupt_listener(runtime.interrupt.clone());
            if format == OutputFormat::Table {
                print_step(&format!("Installing {}", args.component));
            }
            let orchestrator = runtime.orchestrator(context, config);
            let result = orchestrator.run(args.component, args.options());
            report::print_workflow_result(&result, &orchestrator.state_store().path(), format)?;
            Ok(ExitCode::from(result.exit_code()))
        }
        Commands::Resume => {
            spawn_interrupt_listener(runtime.interrupt.clone());
            let orchestrator = runtime.orchestrator(context, config);
            match orchestrator.resume() {
                Ok(result) => {
                    report::print_workflow_result(
                        &result,
                        &orchestrator.state_store().path(),
                        format,
                    )?;
                    Ok(ExitCode::from(result.exit_code()))
                }
                Err(err) => {
                    report::print_errors(&[WorkflowError::from(err)]);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Health {
            component,
            timeout,
            retries,
        } => {
            spawn_interrupt_listener(runtime.interrupt.clone());
            let timeout = timeout
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.health.timeout());
            let retries = retries.unwrap_or(config.health.retries);
            let orchestrator = runtime.orchestrator(context, config);
            let health = orchestrator.check_health(component, timeout, retries);
            report::print_health(&health, format)?;
            Ok(if health.is_unhealthy() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
        Commands::Workspace(args) => run_workspace(args.command, context, &runtime, format),
        Commands::Status => {
            let orchestrator = runtime.orchestrator(context, config);
            match orchestrator.pending_state() {
                Ok(state) => {
                    report::print_state(state.as_ref(), &orchestrator.state_store().path(), format)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    report::print_errors(&[WorkflowError::from(err)]);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::Reset { yes } => {
            let orchestrator = runtime.orchestrator(context, config);
            let path = orchestrator.state_store().path();
            if !orchestrator.state_store().exists() {
                println!("No installation in progress.");
                return Ok(ExitCode::SUCCESS);
            }
            let confirmed = yes
                || Confirm::with_theme(&ColorfulTheme::default())
                    .with_prompt(format!("Discard saved progress in {}?", path.display()))
                    .default(false)
                    .interact()?;
            if !confirmed {
                println!("Reset cancelled.");
                return Ok(ExitCode::SUCCESS);
            }
            match orchestrator.discard() {
                Ok(_) => {
                    println!("Discarded {}", path.display());
                    Ok(ExitCode::SUCCESS)
                }
                Err(err) => {
                    report::print_errors(&[WorkflowError::from(err)]);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
    }
}

fn run_workspace(
    command: WorkspaceCommand,
    context: &AppContext,
    runtime: &Runtime,
    format: OutputFormat,
) -> Result<ExitCode> {
    let store = context.config_store();
    let manager = WorkspaceManager::new(context.base_dir(), &runtime.secrets, &runtime.renderer)
        .with_registry(&store);
    let resolve = |path: Option<PathBuf>| path.unwrap_or_else(|| context.base_dir().to_path_buf());

    let ok = match command {
        WorkspaceCommand::Validate { path } => {
            let path = resolve(path);
            match manager.validate(&path) {
                Ok(result) => {
                    report::print_validation(&path, &result, format)?;
                    result.is_valid
                }
                Err(err) => return Ok(workspace_failure(err)),
            }
        }
        WorkspaceCommand::Init { name } => {
            match manager.initialize_new(name.as_deref().unwrap_or("")) {
                Ok(result) => {
                    report::print_initialized(&result, format)?;
                    true
                }
                Err(err) => return Ok(workspace_failure(err)),
            }
        }
        WorkspaceCommand::Deps { path } => {
            let path = resolve(path);
            match manager.detect_missing_dependencies(&path, &runtime.services) {
                Ok(deps) => {
                    report::print_dependencies(&path, &deps, format)?;
                    deps.is_satisfied()
                }
                Err(err) => return Ok(workspace_failure(err)),
            }
        }
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn workspace_failure(err: WorkspaceError) -> ExitCode {
    report::print_errors(&[WorkflowError::from(err)]);
    ExitCode::FAILURE
}

/// Ctrl-C sets the shared flag; the pipeline stops at its next checkpoint.
fn spawn_interrupt_listener(interrupt: Interrupt) {
    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(err) => {
                warn!(error = %err, "Ctrl-C handling unavailable");
                return;
            }
        };
        runtime.block_on(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if interrupt.is_triggered() {
                    warn!("already stopping; waiting for progress to be saved");
                } else {
                    debug!("interrupt received");
                    eprintln!("\nInterrupted; saving progress...");
                    interrupt.trigger();
                }
            }
        });
    });
}

//! Tool configuration (`stagehand.toml`)
//!
//! Lives in the platform config directory and covers datastore and service
//! endpoints, health thresholds, readiness polling and workspace defaults.

pub mod parser;
pub mod schema;
pub mod store;

pub use parser::{parse_config, parse_config_str, to_toml};
pub use schema::{
    Backoff, DatastoreConfig, HealthConfig, ServiceConfig, StagehandConfig, Threshold,
    WorkflowConfig, WorkspaceConfig,
};
pub use store::{CONFIG_FILE_NAME, ConfigStore};

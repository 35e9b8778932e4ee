pub mod clock;
pub mod command;
pub mod config;
pub mod coordination;
pub mod dashboard;
pub mod interaction;
pub mod orchestrator;
pub mod platform;
pub mod records;
pub mod render;
pub mod scheduler;
pub mod store;

use ed25519_dalek::VerifyingKey;

pub use orchestrator::{Actor, Orchestrator, Reply, Timing, WorkflowError};

/// Correlation id attached to each inbound interaction for log tracing.
#[derive(Debug, Clone)]
pub struct CorrelationId(pub String);

pub struct AppState {
    pub orchestrator: Orchestrator,
    /// Key inbound interaction signatures are checked against.
    pub public_key: VerifyingKey,
    /// Bearer token for `/api`; `None` disables the dashboard routes.
    pub dashboard_auth_token: Option<String>,
}

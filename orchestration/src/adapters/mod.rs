//! Replaceable adapters behind narrow interfaces: agent CLIs, execution
//! providers and notification channels.
//!
//! The orchestrator core only ever talks to these traits; concrete
//! integrations (Docker, SSH, chat sinks) plug in without touching the PM
//! loop.

mod agent;
mod execution;
mod notify;

pub use agent::{
    AdapterRegistry, AgentAdapter, AdapterDetection, CliAgentAdapter, EnforcementStrategy,
    EnforcementType, SpawnOptions, SpawnResult,
};
pub use execution::{ExecutionProvider, ExecutionStatus, LocalExecutor};
pub use notify::{
    DigestQueue, LogChannel, Notification, NotificationChannel, NotificationRouter, Severity,
    WebhookChannel,
};

/// Error type for adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter unavailable: {0}")]
    Unavailable(String),

    #[error("no adapter claims model `{0}`")]
    UnknownModel(String),

    #[error("external command timed out: {0}")]
    Timeout(String),

    #[error("adapter I/O failure: {0}")]
    Io(String),
}

/// Result type for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;

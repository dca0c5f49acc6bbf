//! Shared memory — versioned channels, per-agent logs, relevance scoring and
//! entry lifecycle.
//!
//! Channels are single-publisher versioned slots validated against a schema
//! before every publish. The relevance engine scores entries so agents load
//! only what matters; the lifecycle engine summarises, archives and evicts.

mod agent_log;
mod channels;
mod lifecycle;
mod loader;
mod relevance;

pub use agent_log::{AgentLogStore, AgentMemoryQuery, LogKind, LogRecord};
pub use channels::{ChannelEnvelope, ChannelIndexEntry, ChannelStore, EnvelopeSummary, PublishMeta};
pub use lifecycle::{
    ConsolidationReport, EntryState, LifecycleConfig, LifecycleEngine, TargetTransition,
};
pub use loader::{LoadedEntry, LoadingConfig, MemoryLoader, Tier};
pub use relevance::{
    MemoryRecord, RelevanceConfig, RelevanceScorer, RelevanceWeights, ScoredEntry, TaskContext,
};

use crate::store::StoreError;

/// Error type for memory operations.
#[derive(Debug, thiserror::Error)]
pub enum MemoryError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;

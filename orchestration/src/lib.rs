//! Pilot orchestration library
//!
//! Long-running coordination for a fleet of autonomous coding agents working
//! on one repository:
//! - Session registry with leasing, heartbeats and filesystem claim
//!   arbitration
//! - Versioned shared-memory channels with schema validation, plus
//!   relevance-scored loading, summarisation and eviction
//! - Context-pressure tracking with automatic checkpoints and resume
//!   prompts
//! - Pre-execution drift scoring with refresh/redirect guardrails
//! - A skill-scored task router with a confidence gate
//! - A process supervisor with rotating logs and polling tailers
//! - A bounded persistent action queue feeding the PM agent
//! - The PM control loop tying it all together
//!
//! Everything coordinates through a project-rooted filesystem tree (see
//! [`paths::StateLayout`]); there is no shared in-memory state between
//! processes.

pub mod actions;
pub mod adapters;
pub mod capsule;
pub mod config;
pub mod drift;
pub mod events;
pub mod memory;
pub mod paths;
pub mod pm;
pub mod pressure;
pub mod registry;
pub mod router;
pub mod session;
pub mod store;
pub mod supervisor;
pub mod util;
pub mod worktree;

// Re-export the types most callers need.
pub use actions::{Action, ActionPriority, ActionQueue, ActionStatus, ActionType, QueueDrain};
pub use capsule::{Capsule, CapsuleStep};
pub use config::{ConfigError, PilotConfig};
pub use drift::{
    DriftLevel, DriftScorer, DriftStore, GuardrailAction, GuardrailConfig, GuardrailEngine,
    PlanStep, ToolIntent,
};
pub use events::{Event, EventKind, EventLog};
pub use memory::{
    AgentLogStore, ChannelStore, LifecycleEngine, MemoryLoader, PublishMeta, RelevanceScorer,
};
pub use paths::StateLayout;
pub use pm::{PmLoop, TaskCache, TickReport};
pub use pressure::{Checkpoint, CheckpointStore, PressureTracker, PM_SENTINEL_TASK, RESUME_ENV};
pub use registry::{Domain, ProjectRegistry, RegistryEntry};
pub use router::{RoleProfile, RouteDecision, TaskRouter, TaskSpec};
pub use session::{ClaimOutcome, SessionHealth, SessionRecord, SessionRegistry, SessionStatus};
pub use supervisor::{ProcessSupervisor, RotatingLog};
pub use worktree::WorktreeManager;

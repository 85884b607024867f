//! Orchestration core of the recommendation push service.
//!
//! The [`scheduler::Scheduler`] decides when the composite workflow runs, the
//! [`coordinator::PipelineCoordinator`] sequences its three stages, and each
//! stage fans out over users through [`executor::bounded_map_reduce`].
//! Everything outside this crate is reached through the traits in [`ports`].

pub mod aggregate;
pub mod coordinator;
pub mod error;
pub mod executor;
pub mod heuristic;
pub mod merge;
pub mod ports;
pub mod scheduler;
pub mod text;

pub use aggregate::{aggregate, search_by_keywords};
pub use coordinator::{
    BroadcastOutcome, Collaborators, PipelineCoordinator, PipelineSettings, ProfileOutcome, ProfileStageReport,
    PushOutcome, PushStageReport, WorkflowReport,
};
pub use error::{PipelineError, PortError};
pub use executor::{bounded_map_reduce, run_bounded, ItemOutcome, RunStats};
pub use merge::merge_profiles;
pub use ports::{
    ActivitySource, BroadcastSource, KnowledgeSearch, ProfileInference, ProfileStore, Pusher,
    Recipient, RecommendationStore, SourceData,
};
pub use scheduler::{
    Clock, ScheduledWorkflow, Scheduler, SchedulerHandle, SchedulerSettings, TaskDescriptor,
    TaskKind,
};

//! Orchestration core for the talking-head synthesis service.
//!
//! The [`manager::TaskManager`] is the single entry point: it owns the task
//! registry, the artifact store, and the execution slots, and drives every
//! task through `Queued → Processing → {Completed | Failed}`.  The HTTP
//! layer holds a `TaskManager` handle and nothing else.

pub mod engine;
pub mod files;
pub mod manager;
pub mod registry;
pub mod scheduler;
pub mod types;

pub use engine::{EngineError, ProcessEngine, SynthesisEngine};
pub use files::FileStore;
pub use manager::{ManagerOptions, TaskManager, Upload};
pub use registry::TaskRegistry;
pub use scheduler::{SlotPermit, SlotPool};
pub use types::{
    ArtifactKind, CoreError, Failure, FailureKind, GenerationParams, Preprocess, TaskId,
    TaskSnapshot, TaskState,
};
